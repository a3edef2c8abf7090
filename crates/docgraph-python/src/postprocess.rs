//! Post-processing: analysis that needs the complete graph.
//!
//! Runs once, after every module has reached `Processed`; running earlier
//! would silently produce wrong linearizations for forward references. The
//! passes execute in a fixed order:
//!
//! 1. base-resolution finalize and MRO computation
//! 2. subclass back-links
//! 3. derived-kind fixups: exception detection, promotion of inherited
//!    class variables to instance variables
//! 4. privacy classification cache priming

use crate::model::{ClassOrName, EntityId, EntityKind};
use crate::mro::HierarchyFinalizer;
use crate::system::System;

/// Exception class names in the standard library.
const STD_LIB_EXCEPTIONS: &[&str] = &[
    "ArithmeticError",
    "AssertionError",
    "AttributeError",
    "BaseException",
    "BlockingIOError",
    "BrokenPipeError",
    "BufferError",
    "BytesWarning",
    "ChildProcessError",
    "ConnectionAbortedError",
    "ConnectionError",
    "ConnectionRefusedError",
    "ConnectionResetError",
    "DeprecationWarning",
    "EOFError",
    "EnvironmentError",
    "Exception",
    "FileExistsError",
    "FileNotFoundError",
    "FloatingPointError",
    "FutureWarning",
    "GeneratorExit",
    "IOError",
    "ImportError",
    "ImportWarning",
    "IndentationError",
    "IndexError",
    "InterruptedError",
    "IsADirectoryError",
    "KeyError",
    "KeyboardInterrupt",
    "LookupError",
    "MemoryError",
    "ModuleNotFoundError",
    "NameError",
    "NotADirectoryError",
    "NotImplementedError",
    "OSError",
    "OverflowError",
    "PendingDeprecationWarning",
    "PermissionError",
    "ProcessLookupError",
    "RecursionError",
    "ReferenceError",
    "ResourceWarning",
    "RuntimeError",
    "RuntimeWarning",
    "StopAsyncIteration",
    "StopIteration",
    "SyntaxError",
    "SyntaxWarning",
    "SystemError",
    "SystemExit",
    "TabError",
    "TimeoutError",
    "TypeError",
    "UnboundLocalError",
    "UnicodeDecodeError",
    "UnicodeEncodeError",
    "UnicodeError",
    "UnicodeTranslateError",
    "UnicodeWarning",
    "UserWarning",
    "ValueError",
    "Warning",
    "ZeroDivisionError",
];

impl System {
    /// Run the inheritance engine and follow-up passes over the whole
    /// graph.
    ///
    /// Must not start before every module is `Processed`: the MRO needs the
    /// complete base-class graph.
    pub fn post_process(&mut self) {
        debug_assert!(
            self.unprocessed_modules().is_empty(),
            "post-processing requires every module to be processed"
        );

        let classes = self.objects_of_kind(EntityKind::is_class);
        let mut finalizer = HierarchyFinalizer::new(self, &classes);
        finalizer.compute_mros(self);

        for &class in &classes {
            let bases: Vec<EntityId> = match self[class].class() {
                Some(details) => details.base_objects().iter().flatten().copied().collect(),
                None => Vec::new(),
            };
            for base in bases {
                if let Some(details) = self[base].class_mut() {
                    details.subclasses.push(class);
                }
            }
        }

        for &class in &classes {
            if self.is_exception(class) {
                self[class].kind = EntityKind::Exception;
            }
        }

        for attribute in self.objects_of_kind(EntityKind::is_attribute) {
            self.inherit_instance_variable_kind(attribute);
        }

        let everything: Vec<EntityId> = self.all_objects().map(|(_, id)| id).collect();
        for id in everything {
            self.privacy_class(id);
        }
        self.post_processed = true;
    }

    /// Whether the class should be documented as an exception: some entry
    /// of its MRO ancestry names a well-known standard exception type.
    fn is_exception(&self, class: EntityId) -> bool {
        self.mro(class, true, false).iter().any(|entry| match entry {
            ClassOrName::Name(name) => STD_LIB_EXCEPTIONS.contains(&name.as_str()),
            ClassOrName::Class(_) => false,
        })
    }

    /// If any inherited source of a class variable is an instance variable,
    /// the subclass' class variable becomes an instance variable as well.
    fn inherit_instance_variable_kind(&mut self, attribute: EntityId) {
        if self[attribute].kind != EntityKind::ClassVariable {
            return;
        }
        let inherited = self
            .doc_sources(attribute)
            .into_iter()
            .skip(1)
            .any(|source| self[source].kind == EntityKind::InstanceVariable);
        if inherited {
            self[attribute].kind = EntityKind::InstanceVariable;
        }
    }
}
