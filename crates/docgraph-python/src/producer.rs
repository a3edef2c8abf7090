//! The producer seam.
//!
//! The syntax-tree visitor that turns source text into entities lives
//! outside this crate. The registry only needs one capability from it:
//! build the contents of a single module on demand. Builds are re-entrant —
//! handling an import inside `build_module` may call back into
//! [`System::get_processed_module`] for another module, which is how
//! circular imports resolve.

use thiserror::Error;

use crate::model::EntityId;
use crate::system::System;

/// Errors from building a module.
///
/// A build error never aborts the run: the registry reports it and marks
/// the module processed with whatever partial content was built.
#[derive(Debug, Error)]
pub enum BuildError {
    /// The source text could not be parsed.
    #[error("cannot parse {path}: {message}")]
    Parse { path: String, message: String },

    /// The source could not be read.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Any other producer-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Builds module contents by driving the [`System`] construction API.
pub trait Producer {
    /// Populate `module` with entities.
    ///
    /// The module's source is available through its `source_path` or
    /// [`crate::model::Entity::source_text`]. The implementation may
    /// re-enter the registry to force other modules to be built first.
    fn build_module(&mut self, system: &mut System, module: EntityId) -> Result<(), BuildError>;
}

/// A producer that builds nothing; modules stay empty.
///
/// Useful for driving the processing state machine in tests and for
/// discovery-only runs.
#[derive(Debug, Default)]
pub struct NoopProducer;

impl Producer for NoopProducer {
    fn build_module(&mut self, _system: &mut System, _module: EntityId) -> Result<(), BuildError> {
        Ok(())
    }
}
