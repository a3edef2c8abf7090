//! The registry: a collection of related documentable entities.
//!
//! [`System`] owns the entity arena and every index over it:
//! - `allobjects`: qualified name → entity, the canonical registry map
//!   (`BTreeMap` for deterministic iteration)
//! - the root list and the per-module processing queue
//! - the report sink and the privacy cache
//!
//! The registry is a single owned structure passed `&mut` to all
//! components; there is exactly one logical worker and no locking. The only
//! non-trivial control-flow property is reentrancy: building one module can
//! force another module to be built first, and circular imports re-enter
//! [`System::get_processed_module`] for a module that is still mid-build.
//! Detection is the per-module state flag itself, never recursion depth.

use std::collections::{BTreeMap, HashMap};
use std::ops::{Index, IndexMut};

use chrono::{DateTime, Utc};
use thiserror::Error;

use docgraph_core::qnmatch::QnamePattern;
use docgraph_core::report::{Reporter, Severity};

use crate::model::{
    Annotation, AnnotationSource, Details, Entity, EntityId, EntityInit, EntityKind, LineNumber,
    Overload, ProcessingState,
};
use crate::privacy::PrivacyClass;
use crate::producer::Producer;

// ============================================================================
// Options
// ============================================================================

/// Configuration for a [`System`].
#[derive(Debug, Clone)]
pub struct SystemOptions {
    /// Project name used in diagnostics.
    pub project_name: String,
    /// Privacy override rules, in increasing precedence order. Each rule
    /// pairs a privacy level with a qualified-name glob pattern.
    pub privacy: Vec<(PrivacyClass, String)>,
}

impl Default for SystemOptions {
    fn default() -> Self {
        SystemOptions {
            project_name: "my project".to_string(),
            privacy: Vec::new(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// The root segment of a qualified name matches no known root entity.
#[derive(Debug, Error)]
#[error("name {name:?} is not under any known root")]
pub struct ForeignNameError {
    pub name: String,
}

/// Errors from [`System::reparent`].
#[derive(Debug, Error)]
pub enum ReparentError {
    /// Root entities cannot be reparented.
    #[error("cannot reparent root entity {name:?}")]
    RootEntity { name: String },

    /// The new owner must be a module or package.
    #[error("new owner {name:?} is not a module")]
    OwnerNotModule { name: String },

    /// The old owner cannot record the forwarding alias.
    #[error("old owner {name:?} cannot hold import aliases")]
    OwnerNotScope { name: String },
}

// ============================================================================
// System
// ============================================================================

/// A collection of related documentable entities, usually the contents of a
/// package tree.
#[derive(Debug)]
pub struct System {
    options: SystemOptions,
    entities: Vec<Entity>,
    /// Canonical registry: qualified name → entity. Every live entity's
    /// qualified name maps to exactly one entity at any instant.
    allobjects: BTreeMap<String, EntityId>,
    roots: Vec<EntityId>,
    unprocessed_modules: Vec<EntityId>,
    /// Names of modules currently being built, innermost last.
    processing_modules: Vec<String>,
    module_count: usize,
    buildtime: DateTime<Utc>,
    reporter: Reporter,
    pub(crate) privacy_rules: Vec<(PrivacyClass, QnamePattern)>,
    /// Privacy results keyed by qualified name, so a reparented entity's
    /// recorded privacy stays bound to the name it was computed under.
    pub(crate) privacy_cache: HashMap<String, PrivacyClass>,
    pub(crate) post_processed: bool,
}

impl System {
    /// Create a system with a count-only report sink.
    pub fn new(options: SystemOptions) -> System {
        Self::with_reporter(options, Reporter::new())
    }

    /// Create a system with a caller-supplied report sink (e.g. a capturing
    /// one for tests or diagnostics output).
    pub fn with_reporter(options: SystemOptions, reporter: Reporter) -> System {
        let mut system = System {
            options,
            entities: Vec::new(),
            allobjects: BTreeMap::new(),
            roots: Vec::new(),
            unprocessed_modules: Vec::new(),
            processing_modules: Vec::new(),
            module_count: 0,
            buildtime: std::time::SystemTime::now().into(),
            reporter,
            privacy_rules: Vec::new(),
            privacy_cache: HashMap::new(),
            post_processed: false,
        };
        system.compile_privacy_rules();
        system
    }

    fn compile_privacy_rules(&mut self) {
        let rules = std::mem::take(&mut self.options.privacy);
        for (privacy, pattern) in &rules {
            match QnamePattern::new(pattern) {
                Ok(compiled) => self.privacy_rules.push((*privacy, compiled)),
                Err(err) => self
                    .reporter
                    .report("privacy", err.to_string(), Severity::Violation),
            }
        }
        self.options.privacy = rules;
    }

    pub fn options(&self) -> &SystemOptions {
        &self.options
    }

    pub fn reporter(&self) -> &Reporter {
        &self.reporter
    }

    pub fn reporter_mut(&mut self) -> &mut Reporter {
        &mut self.reporter
    }

    /// When this system was created.
    pub fn buildtime(&self) -> DateTime<Utc> {
        self.buildtime
    }

    /// Entity accessor that tolerates foreign ids.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.index())
    }

    /// Number of modules and packages added so far.
    pub fn module_count(&self) -> usize {
        self.module_count
    }

    // ========================================================================
    // Qualified names
    // ========================================================================

    /// The dot-joined path from a root to this entity through the ownership
    /// tree. Derived from the parent chain, never stored.
    pub fn full_name(&self, id: EntityId) -> String {
        match self[id].parent {
            Some(parent) => format!("{}.{}", self.full_name(parent), self[id].name),
            None => self[id].name.clone(),
        }
    }

    /// A string describing the entity's source location to the user: its
    /// file path when known, the module's full name otherwise.
    pub fn description(&self, id: EntityId) -> String {
        match &self[id].source_path {
            Some(path) => path.display().to_string(),
            None => self.full_name(self.module_of(id)),
        }
    }

    /// The nearest enclosing module or package; the entity itself for
    /// modules.
    pub fn module_of(&self, id: EntityId) -> EntityId {
        let mut current = id;
        loop {
            if self[current].kind.is_module() {
                return current;
            }
            match self[current].parent {
                Some(parent) => current = parent,
                None => return current,
            }
        }
    }

    // ========================================================================
    // Registry lookups
    // ========================================================================

    /// Direct registry lookup, no resolution logic.
    pub fn lookup(&self, full_name: &str) -> Option<EntityId> {
        self.allobjects.get(full_name).copied()
    }

    /// Look up an entity using a potentially outdated qualified name.
    ///
    /// A name becomes outdated when the entity is reparented: the registry
    /// only knows the new name, but the old owner keeps a forwarding alias.
    /// The root segment is resolved against the known roots and the rest is
    /// re-expanded from there.
    ///
    /// Returns `Ok(None)` when the root is known but nothing is reachable
    /// under the name, and [`ForeignNameError`] when the root segment itself
    /// matches no known root.
    pub fn find_object(&self, full_name: &str) -> Result<Option<EntityId>, ForeignNameError> {
        if let Some(id) = self.lookup(full_name) {
            return Ok(Some(id));
        }
        let (root_segment, rest) = match full_name.split_once('.') {
            Some((head, tail)) => (head, Some(tail)),
            None => (full_name, None),
        };
        for &root in &self.roots {
            if self[root].name == root_segment {
                if let Some(rest) = rest {
                    let expanded = self.expand_name(root, rest);
                    return Ok(self.lookup(&expanded));
                }
                return Ok(None);
            }
        }
        Err(ForeignNameError {
            name: full_name.to_string(),
        })
    }

    /// Root entities in addition order.
    pub fn roots(&self) -> &[EntityId] {
        &self.roots
    }

    /// The top-level package/module names in this system.
    pub fn root_names(&self) -> Vec<&str> {
        self.roots.iter().map(|&r| self[r].name()).collect()
    }

    /// All registered `(qualified name, entity)` pairs in name order.
    pub fn all_objects(&self) -> impl Iterator<Item = (&str, EntityId)> {
        self.allobjects.iter().map(|(name, &id)| (name.as_str(), id))
    }

    /// All registered entities whose kind satisfies `filter`, in qualified
    /// name order.
    pub fn objects_of_kind(&self, filter: fn(EntityKind) -> bool) -> Vec<EntityId> {
        self.allobjects
            .values()
            .copied()
            .filter(|&id| filter(self[id].kind))
            .collect()
    }

    // ========================================================================
    // Construction
    // ========================================================================

    /// Create an entity and install it into the graph.
    ///
    /// With an owner, the entity takes the owner's child slot for its name;
    /// without one it becomes a root. The registry slot for the qualified
    /// name is claimed, and an occupied slot is delegated to the duplicate
    /// handler instead of being overwritten.
    pub fn add_entity(&mut self, init: EntityInit) -> EntityId {
        let mut init = init;
        if let Some(parent) = init.parent {
            // Functions nested in a class are methods.
            if init.kind == EntityKind::Function && self[parent].kind.is_class() {
                init.kind = EntityKind::Method;
            }
            if init.source_path.is_none() {
                init.source_path = self[parent].source_path.clone();
            }
        } else if !init.kind.is_module() {
            self.reporter.report(
                "addObject",
                format!("top-level object {:?} is not a module", init.name),
                Severity::Violation,
            );
        }
        let id = EntityId(self.entities.len() as u32);
        self.entities.push(Entity::new(id, init));
        self.install(id);
        id
    }

    /// Override-guarded entity creation for alternate control-flow branches:
    /// if the name is already bound in the owning scope the addition is
    /// suppressed, modeling "the first branch visited wins".
    pub fn add_entity_guarded(&mut self, init: EntityInit) -> Option<EntityId> {
        if let Some(parent) = init.parent {
            if self.is_locally_bound(parent, &init.name) {
                tracing::debug!(
                    name = %init.name,
                    scope = %self.full_name(parent),
                    "not overriding existing binding from an alternate branch"
                );
                return None;
            }
        }
        Some(self.add_entity(init))
    }

    fn install(&mut self, id: EntityId) {
        match self[id].parent {
            Some(parent) => {
                let name = self[id].name.clone();
                self[parent].install_child(&name, id);
            }
            None => self.roots.push(id),
        }
        let full_name = self.full_name(id);
        match self.lookup(&full_name) {
            Some(existing) if existing != id => self.handle_duplicate(full_name, id),
            _ => {
                self.allobjects.insert(full_name, id);
            }
        }
    }

    // ========================================================================
    // Duplicates
    // ========================================================================

    /// Resolve a qualified-name collision, e.g.:
    ///
    /// ```text
    /// class C:
    ///     if something:
    ///         def meth(self): ...   # first definition
    ///     else:
    ///         def meth(self): ...   # second definition wins
    /// ```
    ///
    /// The new entity takes the canonical slot. The previous occupant is
    /// renamed to `"<name> <counter>"` (smallest free counter) and re-added
    /// together with its whole subtree, so it stays reachable through the
    /// registry for diagnostics even though it no longer owns a child slot.
    fn handle_duplicate(&mut self, full_name: String, new: EntityId) {
        let mut counter = 0;
        while self
            .allobjects
            .contains_key(&format!("{full_name} {counter}"))
        {
            counter += 1;
        }
        let Some(prev) = self.lookup(&full_name) else {
            return;
        };
        self.report_for(
            new,
            "addObject",
            format!("duplicate {:?} {:?}", self[prev].kind, full_name),
            Severity::Info,
        );
        self.remove_subtree(prev);
        self[prev].name = format!("{} {}", self[new].name, counter);
        self.readd_subtree(prev);
        self.allobjects.insert(full_name, new);
    }

    /// Remove an entity and all transitively owned descendants from the
    /// registry map, under their current qualified names.
    fn remove_subtree(&mut self, id: EntityId) {
        let full_name = self.full_name(id);
        self.allobjects.remove(&full_name);
        let children = self[id].children().to_vec();
        for child in children {
            self.remove_subtree(child);
        }
    }

    /// Re-insert an entity and all descendants under their current
    /// qualified names, overwriting occupied slots.
    fn readd_subtree(&mut self, id: EntityId) {
        let full_name = self.full_name(id);
        self.allobjects.insert(full_name, id);
        let children = self[id].children().to_vec();
        for child in children {
            self.readd_subtree(child);
        }
    }

    // ========================================================================
    // Reparenting
    // ========================================================================

    /// Move an entity (and its owned subtree) to a new owner under a new
    /// name, preserving its identity.
    ///
    /// The four steps — remove old names from the registry, mutate
    /// parent/name, re-add new names, move the owner child slot — are atomic
    /// from the registry's point of view: nothing observes the intermediate
    /// state. The old owner keeps a local alias `old name → new full name`
    /// so stale qualified names remain resolvable through
    /// [`System::find_object`].
    pub fn reparent(
        &mut self,
        id: EntityId,
        new_owner: EntityId,
        new_name: &str,
    ) -> Result<(), ReparentError> {
        let old_owner = self[id].parent.ok_or_else(|| ReparentError::RootEntity {
            name: self.full_name(id),
        })?;
        if !self[new_owner].kind.is_module() {
            return Err(ReparentError::OwnerNotModule {
                name: self.full_name(new_owner),
            });
        }
        if self[old_owner].aliases().is_none() {
            return Err(ReparentError::OwnerNotScope {
                name: self.full_name(old_owner),
            });
        }

        self.remove_subtree(id);
        let old_name = self[id].name.clone();
        self[id].parent = Some(new_owner);
        self[id].name = new_name.to_string();
        self.readd_subtree(id);

        self[old_owner].remove_child(&old_name);
        let new_full_name = self.full_name(id);
        self.bind_alias(old_owner, &old_name, &new_full_name, false);
        self[new_owner].install_child(new_name, id);
        Ok(())
    }

    // ========================================================================
    // Docstrings, lines and detail setters
    // ========================================================================

    /// Set the docstring, reporting when an existing one is overridden.
    pub fn set_docstring(&mut self, id: EntityId, text: &str, lineno: u32) {
        if let Some(existing) = &self[id].docstring {
            let message = format!(
                "existing docstring at line {} is overridden",
                existing.lineno
            );
            let description = self.description(id);
            self.reporter.report(
                "docstring",
                format!("{description}:{lineno}: {message}"),
                Severity::Violation,
            );
        }
        self[id].docstring = Some(crate::model::Docstring {
            text: text.to_string(),
            lineno,
        });
    }

    /// Record the entity's line number, honoring provenance precedence: a
    /// tree-derived line wins over a docstring-field line and is never
    /// overwritten.
    pub fn set_line_number(&mut self, id: EntityId, line: LineNumber) {
        self[id].linenumber.update(line);
    }

    /// Record the `__all__` export list of a module, warning when it is
    /// assigned more than once.
    pub fn set_exported_names(&mut self, id: EntityId, names: Vec<String>) {
        if self[id].module().is_some_and(|m| m.exported.is_some()) {
            self.report_for(
                id,
                "all",
                "assignment to \"__all__\" overrides previous assignment",
                Severity::Violation,
            );
        }
        if let Some(module) = self[id].module_mut() {
            module.exported = Some(names);
        }
    }

    /// Record an attribute's assigned value expression.
    pub fn set_attribute_value(&mut self, id: EntityId, expr: impl Into<String>) {
        if let Some(attribute) = self[id].attribute_mut() {
            attribute.value = Some(expr.into());
        }
    }

    /// Record an attribute's type annotation. Explicit annotations always
    /// win; an inferred annotation only fills an empty slot and never
    /// replaces anything.
    pub fn set_attribute_annotation(
        &mut self,
        id: EntityId,
        text: impl Into<String>,
        source: AnnotationSource,
    ) {
        let Some(attribute) = self[id].attribute_mut() else {
            return;
        };
        match source {
            AnnotationSource::Explicit => {
                attribute.annotation = Some(Annotation {
                    text: text.into(),
                    source,
                });
            }
            AnnotationSource::Inferred => {
                if attribute.annotation.is_none() {
                    attribute.annotation = Some(Annotation {
                        text: text.into(),
                        source,
                    });
                }
            }
        }
    }

    /// Mark a function as async.
    pub fn set_is_async(&mut self, id: EntityId, is_async: bool) {
        if let Some(function) = self[id].function_mut() {
            function.is_async = is_async;
        }
    }

    /// Record a function's parameter annotations in declaration order.
    pub fn set_annotations(&mut self, id: EntityId, annotations: Vec<(String, Option<String>)>) {
        if let Some(function) = self[id].function_mut() {
            function.annotations = annotations;
        }
    }

    /// Append a shadowed overload signature to a function.
    pub fn add_overload(&mut self, id: EntityId, overload: Overload) {
        if let Some(function) = self[id].function_mut() {
            function.overloads.push(overload);
        }
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    /// Report an anomaly about an entity, formatted with its source
    /// location. Docstring-related sections use the docstring's line.
    pub fn report_for(
        &mut self,
        id: EntityId,
        section: &str,
        message: impl Into<String>,
        severity: Severity,
    ) {
        let line = if matches!(section, "docstring" | "resolve_identifier_xref") {
            self[id]
                .docstring
                .as_ref()
                .map(|d| d.lineno)
                .or_else(|| self[id].linenumber.get())
        } else {
            self[id].linenumber.get()
        };
        let line = match line {
            Some(line) => line.to_string(),
            None => "???".to_string(),
        };
        let description = self.description(id);
        let message = message.into();
        self.reporter
            .report(section, format!("{description}:{line}: {message}"), severity);
    }

    // ========================================================================
    // Module processing
    // ========================================================================

    /// Register a module whose source is an in-memory string.
    pub fn add_module_string(
        &mut self,
        text: &str,
        modname: &str,
        parent: Option<EntityId>,
        is_package: bool,
    ) -> Option<EntityId> {
        let kind = if is_package {
            EntityKind::Package
        } else {
            EntityKind::Module
        };
        self.add_unprocessed_module(EntityInit::new(modname, kind, parent), Some(text.to_string()))
    }

    /// Queue a new module, arbitrating duplicate module names first:
    /// a package wins over a module, otherwise the later addition wins.
    ///
    /// Returns `None` when the new module is discarded.
    pub(crate) fn add_unprocessed_module(
        &mut self,
        init: EntityInit,
        source_text: Option<String>,
    ) -> Option<EntityId> {
        let full_name = match init.parent {
            Some(parent) => format!("{}.{}", self.full_name(parent), init.name),
            None => init.name.clone(),
        };
        if let Some(first) = self.lookup(&full_name) {
            if self[first].module().is_some() && !self.handle_duplicate_module(first, &init) {
                return None;
            }
        }
        let id = self.add_entity(init);
        if let Some(text) = source_text {
            if let Some(module) = self[id].module_mut() {
                module.source_text = Some(text);
            }
        }
        self.unprocessed_modules.push(id);
        self.module_count += 1;
        Some(id)
    }

    /// Arbitrate two modules with the same qualified name. Returns whether
    /// the new module should replace the existing one.
    fn handle_duplicate_module(&mut self, first: EntityId, dup: &EntityInit) -> bool {
        if self[first].kind == EntityKind::Package && dup.kind != EntityKind::Package {
            self.report_for(
                first,
                "addObject",
                format!(
                    "discarding duplicate module {:?} because existing package has the same name",
                    dup.name
                ),
                Severity::Info,
            );
            return false;
        }
        self.report_for(
            first,
            "addObject",
            format!(
                "discarding existing {:?} because {:?} overrides it",
                self.full_name(first),
                dup.name
            ),
            Severity::Info,
        );
        self.remove_subtree(first);
        self.unprocessed_modules.retain(|&m| m != first);
        self.roots.retain(|&r| r != first);
        true
    }

    /// Return the module for `modname`, building it on demand.
    ///
    /// A module that is already `Processing` (a circular reference resolved
    /// while it is mid-build) is returned as-is; callers must tolerate the
    /// partial graph.
    pub fn get_processed_module(
        &mut self,
        modname: &str,
        producer: &mut dyn Producer,
    ) -> Option<EntityId> {
        let id = self.lookup(modname)?;
        let state = self[id].module()?.state;
        if state == ProcessingState::Unprocessed {
            self.process_module(id, producer);
        }
        Some(id)
    }

    /// Build one module: Unprocessed → Processing → Processed.
    ///
    /// A build failure is reported and the module is still marked Processed
    /// with whatever partial content was built; the rest of the graph is
    /// unaffected.
    pub fn process_module(&mut self, id: EntityId, producer: &mut dyn Producer) {
        debug_assert_eq!(self[id].state(), ProcessingState::Unprocessed);
        if let Some(module) = self[id].module_mut() {
            module.state = ProcessingState::Processing;
        }
        self.unprocessed_modules.retain(|&m| m != id);
        let full_name = self.full_name(id);
        self.processing_modules.push(full_name);
        tracing::debug!(processing = ?self.processing_modules, "processing module");

        if let Err(err) = producer.build_module(self, id) {
            self.report_for(
                id,
                "parsing",
                format!("cannot build module: {err}"),
                Severity::Violation,
            );
        }

        if let Some(module) = self[id].module_mut() {
            module.state = ProcessingState::Processed;
        }
        let head = self.processing_modules.pop();
        debug_assert_eq!(head.as_deref(), Some(self.full_name(id).as_str()));
        tracing::debug!(
            processed = self.module_count - self.unprocessed_modules.len(),
            total = self.module_count,
            violations = self.reporter.violations(),
            "modules processed"
        );
    }

    /// Build every queued module, then run post-processing.
    pub fn process(&mut self, producer: &mut dyn Producer) {
        while let Some(&id) = self.unprocessed_modules.first() {
            self.process_module(id, producer);
        }
        self.post_process();
    }

    /// Modules still waiting to be built.
    pub fn unprocessed_modules(&self) -> &[EntityId] {
        &self.unprocessed_modules
    }

    /// Whether post-processing has run; MROs and subclass back-links are
    /// only authoritative afterwards.
    pub fn is_post_processed(&self) -> bool {
        self.post_processed
    }
}

// ============================================================================
// Indexing
// ============================================================================

impl Index<EntityId> for System {
    type Output = Entity;

    fn index(&self, id: EntityId) -> &Entity {
        &self.entities[id.index()]
    }
}

impl IndexMut<EntityId> for System {
    fn index_mut(&mut self, id: EntityId) -> &mut Entity {
        &mut self.entities[id.index()]
    }
}

impl Entity {
    /// The local alias map for import-capable scopes (modules and classes).
    pub(crate) fn aliases(&self) -> Option<&HashMap<String, String>> {
        match &self.details {
            Details::Module(m) => Some(&m.aliases),
            Details::Class(c) => Some(&c.aliases),
            _ => None,
        }
    }

    pub(crate) fn aliases_mut(&mut self) -> Option<&mut HashMap<String, String>> {
        match &mut self.details {
            Details::Module(m) => Some(&mut m.aliases),
            Details::Class(c) => Some(&mut c.aliases),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityInit;
    use docgraph_core::report::Reporter;

    fn captured_system() -> System {
        System::with_reporter(SystemOptions::default(), Reporter::with_capture())
    }

    fn add_module(system: &mut System, name: &str) -> EntityId {
        system.add_entity(EntityInit::new(name, EntityKind::Module, None))
    }

    #[test]
    fn test_registry_identity_invariant() {
        let mut system = System::new(SystemOptions::default());
        let module = add_module(&mut system, "mod");
        let class = system.add_entity(EntityInit::new("C", EntityKind::Class, Some(module)));
        let method = system.add_entity(EntityInit::new("m", EntityKind::Function, Some(class)));
        assert_eq!(system.lookup("mod"), Some(module));
        assert_eq!(system.lookup("mod.C"), Some(class));
        assert_eq!(system.lookup("mod.C.m"), Some(method));
        assert_eq!(system.full_name(method), "mod.C.m");
    }

    #[test]
    fn test_function_in_class_becomes_method() {
        let mut system = System::new(SystemOptions::default());
        let module = add_module(&mut system, "mod");
        let class = system.add_entity(EntityInit::new("C", EntityKind::Class, Some(module)));
        let method = system.add_entity(EntityInit::new("m", EntityKind::Function, Some(class)));
        let function = system.add_entity(EntityInit::new("f", EntityKind::Function, Some(module)));
        assert_eq!(system[method].kind, EntityKind::Method);
        assert_eq!(system[function].kind, EntityKind::Function);
    }

    #[test]
    fn test_duplicate_second_definition_wins() {
        let mut system = captured_system();
        let module = add_module(&mut system, "A");
        let first = system.add_entity(EntityInit::new("m", EntityKind::Function, Some(module)));
        let second = system.add_entity(EntityInit::new("m", EntityKind::Function, Some(module)));
        assert_eq!(system.lookup("A.m"), Some(second));
        assert_eq!(system.lookup("A.m 0"), Some(first));
        // The canonical slot owns the child position; the renamed occupant
        // is reachable only through the registry.
        assert_eq!(system[module].child("m"), Some(second));
        assert!(!system.reporter().captured_in("addObject").is_empty());
    }

    #[test]
    fn test_duplicate_counter_takes_next_free_slot() {
        let mut system = captured_system();
        let module = add_module(&mut system, "A");
        let first = system.add_entity(EntityInit::new("m", EntityKind::Function, Some(module)));
        let second = system.add_entity(EntityInit::new("m", EntityKind::Function, Some(module)));
        let third = system.add_entity(EntityInit::new("m", EntityKind::Function, Some(module)));
        assert_eq!(system.lookup("A.m"), Some(third));
        assert_eq!(system.lookup("A.m 0"), Some(first));
        assert_eq!(system.lookup("A.m 1"), Some(second));
    }

    #[test]
    fn test_duplicate_renames_whole_subtree() {
        let mut system = captured_system();
        let module = add_module(&mut system, "A");
        let first = system.add_entity(EntityInit::new("C", EntityKind::Class, Some(module)));
        let first_child =
            system.add_entity(EntityInit::new("attr", EntityKind::ClassVariable, Some(first)));
        let second = system.add_entity(EntityInit::new("C", EntityKind::Class, Some(module)));
        assert_eq!(system.lookup("A.C"), Some(second));
        assert_eq!(system.lookup("A.C 0"), Some(first));
        assert_eq!(system.lookup("A.C 0.attr"), Some(first_child));
        assert_eq!(system.lookup("A.C.attr"), None);
    }

    #[test]
    fn test_reparent_moves_subtree_and_leaves_breadcrumb() {
        let mut system = System::new(SystemOptions::default());
        let src = add_module(&mut system, "src");
        let dst = add_module(&mut system, "dst");
        let class = system.add_entity(EntityInit::new("X", EntityKind::Class, Some(src)));
        let child = system.add_entity(EntityInit::new("y", EntityKind::Function, Some(class)));

        system.reparent(class, dst, "X").unwrap();

        assert_eq!(system.lookup("dst.X"), Some(class));
        assert_eq!(system.lookup("dst.X.y"), Some(child));
        assert_eq!(system.lookup("src.X"), None);
        assert_eq!(system[src].child("X"), None);
        // Stale names stay resolvable through the breadcrumb.
        assert_eq!(system.find_object("src.X").unwrap(), Some(class));
        assert_eq!(system.find_object("src.X.y").unwrap(), Some(child));
    }

    #[test]
    fn test_reparent_rejects_non_module_owner() {
        let mut system = System::new(SystemOptions::default());
        let module = add_module(&mut system, "mod");
        let class = system.add_entity(EntityInit::new("C", EntityKind::Class, Some(module)));
        let function = system.add_entity(EntityInit::new("f", EntityKind::Function, Some(module)));
        let err = system.reparent(function, class, "f").unwrap_err();
        assert!(matches!(err, ReparentError::OwnerNotModule { .. }));
    }

    #[test]
    fn test_find_object_foreign_root_is_distinguishable() {
        let mut system = System::new(SystemOptions::default());
        add_module(&mut system, "known");
        let err = system.find_object("foreign.name").unwrap_err();
        assert_eq!(err.name, "foreign.name");
        assert_eq!(system.find_object("known.gone").unwrap(), None);
    }

    #[test]
    fn test_docstring_override_is_reported() {
        let mut system = captured_system();
        let module = add_module(&mut system, "mod");
        let function = system.add_entity(EntityInit::new("f", EntityKind::Function, Some(module)));
        system.set_docstring(function, "first", 2);
        system.set_docstring(function, "second", 5);
        assert_eq!(system[function].docstring().unwrap().text, "second");
        let reports = system.reporter().captured_in("docstring");
        assert_eq!(reports.len(), 1);
        assert!(reports[0].message.contains("line 2"));
    }

    #[test]
    fn test_exported_names_double_assignment_warns() {
        let mut system = captured_system();
        let module = add_module(&mut system, "mod");
        system.set_exported_names(module, vec!["f".to_string()]);
        system.set_exported_names(module, vec!["g".to_string()]);
        assert_eq!(
            system[module].module().unwrap().exported.as_deref(),
            Some(&["g".to_string()][..])
        );
        assert_eq!(system.reporter().captured_in("all").len(), 1);
    }

    #[test]
    fn test_explicit_annotation_never_replaced_by_inference() {
        let mut system = System::new(SystemOptions::default());
        let module = add_module(&mut system, "mod");
        let attr = system.add_entity(EntityInit::new("x", EntityKind::Variable, Some(module)));
        system.set_attribute_annotation(attr, "int", AnnotationSource::Explicit);
        system.set_attribute_annotation(attr, "str", AnnotationSource::Inferred);
        let annotation = system[attr].attribute().unwrap().annotation.clone().unwrap();
        assert_eq!(annotation.text, "int");
        assert_eq!(annotation.source, AnnotationSource::Explicit);
    }

    #[test]
    fn test_inferred_annotation_fills_empty_slot_only() {
        let mut system = System::new(SystemOptions::default());
        let module = add_module(&mut system, "mod");
        let attr = system.add_entity(EntityInit::new("x", EntityKind::Variable, Some(module)));
        system.set_attribute_annotation(attr, "int", AnnotationSource::Inferred);
        system.set_attribute_annotation(attr, "str", AnnotationSource::Inferred);
        assert_eq!(
            system[attr].attribute().unwrap().annotation.as_ref().unwrap().text,
            "int"
        );
        system.set_attribute_annotation(attr, "bytes", AnnotationSource::Explicit);
        assert_eq!(
            system[attr].attribute().unwrap().annotation.as_ref().unwrap().text,
            "bytes"
        );
    }

    #[test]
    fn test_module_duplicate_package_wins() {
        let mut system = captured_system();
        let package = system
            .add_unprocessed_module(EntityInit::new("pkg", EntityKind::Package, None), None)
            .unwrap();
        let discarded =
            system.add_unprocessed_module(EntityInit::new("pkg", EntityKind::Module, None), None);
        assert_eq!(discarded, None);
        assert_eq!(system.lookup("pkg"), Some(package));
    }

    #[test]
    fn test_module_duplicate_last_wins() {
        let mut system = captured_system();
        let first = system
            .add_unprocessed_module(EntityInit::new("mod", EntityKind::Module, None), None)
            .unwrap();
        let second = system
            .add_unprocessed_module(EntityInit::new("mod", EntityKind::Module, None), None)
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(system.lookup("mod"), Some(second));
        assert_eq!(system.unprocessed_modules(), &[second]);
    }
}
