//! Python semantic model for docgraph.
//!
//! This crate builds and queries the documentable object graph of a Python
//! project:
//! - Entity model: packages, modules, classes, functions, attributes
//! - Registry ([`System`]) keyed by qualified names
//! - Cross-scope name resolution (`expand_name` / `resolve_name`)
//! - Inheritance engine: C3 linearization, subclass back-links
//! - Privacy classification with user-supplied rules

pub mod discover;
pub mod model;
pub mod mro;
pub mod postprocess;
pub mod privacy;
pub mod producer;
pub mod resolve;
pub mod system;

pub use model::{Entity, EntityId, EntityKind, LineNumber, ProcessingState};
pub use privacy::PrivacyClass;
pub use producer::{BuildError, Producer};
pub use system::{System, SystemOptions};
