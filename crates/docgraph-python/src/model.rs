//! Entity model: the documentable node types and their ownership tree.
//!
//! Entities live in an arena owned by [`crate::system::System`] and refer to
//! each other through [`EntityId`] handles. The owning tree is formed by the
//! `parent` pointer and the ordered children list; every other relationship
//! (base classes, subclasses, MRO entries, alias targets) is a non-owning
//! overlay of ids or qualified-name strings and may contain cycles.
//!
//! The containment rules are fixed:
//! - Packages contain packages and modules
//! - Modules contain classes, functions and attributes
//! - Classes contain classes, methods and attributes
//! - Functions contain nothing

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ============================================================================
// EntityId
// ============================================================================

/// Unique identifier for an entity within a [`crate::system::System`].
///
/// Ids are allocated in creation order and are never reused, so they stay
/// valid across duplicate renames and reparenting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct EntityId(pub u32);

impl EntityId {
    /// Index into the system arena.
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ent_{}", self.0)
    }
}

// ============================================================================
// Enums
// ============================================================================

/// Kind of documentable entity.
///
/// Variants are declared in presentation order; the derived `Ord` is used to
/// sort members for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Package,
    Module,
    Class,
    Exception,
    ClassMethod,
    StaticMethod,
    Method,
    Function,
    Constant,
    TypeVariable,
    TypeAlias,
    ClassVariable,
    InstanceVariable,
    Property,
    Variable,
}

impl EntityKind {
    /// Whether this kind is a module-level scope (package or module).
    pub fn is_module(self) -> bool {
        matches!(self, EntityKind::Package | EntityKind::Module)
    }

    /// Whether this kind is a class-level scope.
    pub fn is_class(self) -> bool {
        matches!(self, EntityKind::Class | EntityKind::Exception)
    }

    /// Whether this kind is a function or method flavor.
    pub fn is_function(self) -> bool {
        matches!(
            self,
            EntityKind::Function
                | EntityKind::Method
                | EntityKind::ClassMethod
                | EntityKind::StaticMethod
        )
    }

    /// Whether this kind is an attribute flavor.
    pub fn is_attribute(self) -> bool {
        matches!(
            self,
            EntityKind::Variable
                | EntityKind::ClassVariable
                | EntityKind::InstanceVariable
                | EntityKind::Constant
                | EntityKind::Property
                | EntityKind::TypeAlias
                | EntityKind::TypeVariable
        )
    }
}

/// Per-module build state, used to detect re-entrant processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    #[default]
    Unprocessed,
    Processing,
    Processed,
}

// ============================================================================
// Line numbers and docstrings
// ============================================================================

/// A source line number with its provenance.
///
/// A line derived from syntax-tree analysis takes precedence over one derived
/// from a docstring field and is never overwritten once set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LineNumber {
    #[default]
    Unknown,
    FromAst(u32),
    FromDocstringField(u32),
}

impl LineNumber {
    /// The line value, if known.
    pub fn get(self) -> Option<u32> {
        match self {
            LineNumber::Unknown => None,
            LineNumber::FromAst(n) | LineNumber::FromDocstringField(n) => Some(n),
        }
    }

    /// Apply precedence: keep the existing value unless the new one is
    /// tree-derived and the existing one is not.
    pub(crate) fn update(&mut self, new: LineNumber) {
        match (*self, new) {
            (LineNumber::Unknown, _) => *self = new,
            (LineNumber::FromDocstringField(_), LineNumber::FromAst(_)) => *self = new,
            _ => {}
        }
    }
}

/// A docstring with the line it starts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Docstring {
    pub text: String,
    pub lineno: u32,
}

// ============================================================================
// Kind-specific details
// ============================================================================

/// A base class reference as written in the class statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBase {
    /// The textual name (`Base`, `mod.Base`).
    pub name: String,
    /// The full reference expression as written.
    pub expr: String,
}

/// A resolved class or, when resolution failed, the expanded name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassOrName {
    Class(EntityId),
    Name(String),
}

/// Module and package scope data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModuleDetails {
    /// Local alias map: short name reachable in this scope → best-known
    /// qualified name. Populated by the producer from imports and
    /// assignments.
    pub(crate) aliases: HashMap<String, String>,
    /// Names listed in `__all__`, if present.
    pub exported: Option<Vec<String>>,
    /// Build state for the re-entrancy check.
    pub state: ProcessingState,
    /// Pending source text for modules registered from a string.
    pub(crate) source_text: Option<String>,
}

/// Class scope data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassDetails {
    /// Classes are import-capable scopes too.
    pub(crate) aliases: HashMap<String, String>,
    /// Bases as written, in declaration order.
    pub raw_bases: Vec<RawBase>,
    /// Expanded base names at visit time, parallel to `raw_bases`.
    pub(crate) initial_bases: Vec<String>,
    /// Base objects resolved at visit time, parallel to `raw_bases`.
    pub(crate) initial_base_objects: Vec<Option<EntityId>>,
    /// Base names after post-processing re-resolution.
    pub(crate) final_bases: Option<Vec<String>>,
    /// Base objects after post-processing re-resolution.
    pub(crate) final_base_objects: Option<Vec<Option<EntityId>>>,
    /// Method resolution order, computed once in post-processing.
    pub(crate) mro: Option<Vec<ClassOrName>>,
    /// Back-references, populated only during post-processing.
    pub subclasses: Vec<EntityId>,
}

impl ClassDetails {
    /// Qualified names of the bases: final if computed, initial otherwise.
    pub fn bases(&self) -> &[String] {
        self.final_bases.as_deref().unwrap_or(&self.initial_bases)
    }

    /// Resolved base objects: final if computed, initial otherwise. A `None`
    /// slot means the base could not be found in the system.
    pub fn base_objects(&self) -> &[Option<EntityId>] {
        self.final_base_objects
            .as_deref()
            .unwrap_or(&self.initial_base_objects)
    }
}

/// One shadowed overload signature of a function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overload {
    pub signature: Option<String>,
    pub decorators: Vec<String>,
}

/// Function and method data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FunctionDetails {
    pub is_async: bool,
    /// Parameter annotations in declaration order; `None` for unannotated
    /// parameters.
    pub annotations: Vec<(String, Option<String>)>,
    /// Earlier signatures shadowed by re-definition under the same name.
    pub overloads: Vec<Overload>,
}

/// Where an attribute type annotation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationSource {
    Explicit,
    Inferred,
}

/// An attribute type annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub text: String,
    pub source: AnnotationSource,
}

/// Attribute data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeDetails {
    /// The assigned value expression, if any.
    pub value: Option<String>,
    /// Type annotation. An explicit annotation is never replaced by an
    /// inferred one.
    pub annotation: Option<Annotation>,
}

/// Kind-specific payload of an entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Details {
    Module(ModuleDetails),
    Class(ClassDetails),
    Function(FunctionDetails),
    Attribute(AttributeDetails),
}

impl Details {
    /// The payload variant matching a kind.
    pub(crate) fn for_kind(kind: EntityKind) -> Details {
        if kind.is_module() {
            Details::Module(ModuleDetails::default())
        } else if kind.is_class() {
            Details::Class(ClassDetails::default())
        } else if kind.is_function() {
            Details::Function(FunctionDetails::default())
        } else {
            Details::Attribute(AttributeDetails::default())
        }
    }
}

// ============================================================================
// Entity
// ============================================================================

/// Arguments for creating an entity through
/// [`crate::system::System::add_entity`].
#[derive(Debug, Clone)]
pub struct EntityInit {
    pub name: String,
    pub kind: EntityKind,
    pub parent: Option<EntityId>,
    pub source_path: Option<PathBuf>,
}

impl EntityInit {
    /// Convenience constructor.
    pub fn new(name: impl Into<String>, kind: EntityKind, parent: Option<EntityId>) -> Self {
        EntityInit {
            name: name.into(),
            kind,
            parent,
            source_path: None,
        }
    }

    /// Attach a source path.
    pub fn with_source_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }
}

/// A documentable entity.
///
/// Owned by exactly one parent (or the system root list). The qualified name
/// is derived from the parent chain by
/// [`crate::system::System::full_name`] and never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub(crate) id: EntityId,
    pub(crate) name: String,
    pub(crate) parent: Option<EntityId>,
    pub kind: EntityKind,
    pub(crate) docstring: Option<Docstring>,
    pub(crate) linenumber: LineNumber,
    pub source_path: Option<PathBuf>,
    /// Children in declaration order.
    pub(crate) children: Vec<EntityId>,
    pub(crate) children_by_name: HashMap<String, EntityId>,
    pub(crate) details: Details,
}

impl Entity {
    pub(crate) fn new(id: EntityId, init: EntityInit) -> Entity {
        let details = Details::for_kind(init.kind);
        Entity {
            id,
            name: init.name,
            parent: init.parent,
            kind: init.kind,
            docstring: None,
            linenumber: LineNumber::Unknown,
            source_path: init.source_path,
            children: Vec::new(),
            children_by_name: HashMap::new(),
            details,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Unqualified name segment.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<EntityId> {
        self.parent
    }

    pub fn docstring(&self) -> Option<&Docstring> {
        self.docstring.as_ref()
    }

    pub fn linenumber(&self) -> LineNumber {
        self.linenumber
    }

    /// Owned children in declaration order.
    pub fn children(&self) -> &[EntityId] {
        &self.children
    }

    /// Look up an owned child by name.
    pub fn child(&self, name: &str) -> Option<EntityId> {
        self.children_by_name.get(name).copied()
    }

    /// Install a child under `name`, replacing an existing slot in place so
    /// declaration order is preserved.
    pub(crate) fn install_child(&mut self, name: &str, child: EntityId) {
        match self.children_by_name.insert(name.to_string(), child) {
            Some(prev) => {
                if let Some(slot) = self.children.iter_mut().find(|c| **c == prev) {
                    *slot = child;
                }
            }
            None => self.children.push(child),
        }
    }

    /// Remove the child slot for `name`.
    pub(crate) fn remove_child(&mut self, name: &str) -> Option<EntityId> {
        let prev = self.children_by_name.remove(name)?;
        self.children.retain(|c| *c != prev);
        Some(prev)
    }

    /// Module details, if this is a package or module.
    pub fn module(&self) -> Option<&ModuleDetails> {
        match &self.details {
            Details::Module(m) => Some(m),
            _ => None,
        }
    }

    pub(crate) fn module_mut(&mut self) -> Option<&mut ModuleDetails> {
        match &mut self.details {
            Details::Module(m) => Some(m),
            _ => None,
        }
    }

    /// Class details, if this is a class.
    pub fn class(&self) -> Option<&ClassDetails> {
        match &self.details {
            Details::Class(c) => Some(c),
            _ => None,
        }
    }

    pub(crate) fn class_mut(&mut self) -> Option<&mut ClassDetails> {
        match &mut self.details {
            Details::Class(c) => Some(c),
            _ => None,
        }
    }

    /// Function details, if this is a function or method.
    pub fn function(&self) -> Option<&FunctionDetails> {
        match &self.details {
            Details::Function(f) => Some(f),
            _ => None,
        }
    }

    pub(crate) fn function_mut(&mut self) -> Option<&mut FunctionDetails> {
        match &mut self.details {
            Details::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Attribute details, if this is an attribute.
    pub fn attribute(&self) -> Option<&AttributeDetails> {
        match &self.details {
            Details::Attribute(a) => Some(a),
            _ => None,
        }
    }

    pub(crate) fn attribute_mut(&mut self) -> Option<&mut AttributeDetails> {
        match &mut self.details {
            Details::Attribute(a) => Some(a),
            _ => None,
        }
    }

    /// Pending source text for modules registered from a string.
    pub fn source_text(&self) -> Option<&str> {
        self.module().and_then(|m| m.source_text.as_deref())
    }

    /// Build state; `Processed` for non-modules.
    pub fn state(&self) -> ProcessingState {
        match self.module() {
            Some(m) => m.state,
            None => ProcessingState::Processed,
        }
    }
}
