//! Cross-scope name resolution.
//!
//! Resolution walks dotted names segment by segment, re-anchoring at each
//! resolved entity. The lookup order for a segment is: the scope's owned
//! children, its local alias map, then the enclosing scope (with the module
//! as the outermost lexical scope — module scopes never recurse outward).
//! Class scopes additionally search their MRO for non-first segments.
//!
//! Resolution never fails: as soon as a segment cannot be mapped to a known
//! entity the walk stops and the remaining suffix is concatenated verbatim,
//! producing a best-effort qualified name.
//!
//! To make the motivating case concrete, consider:
//!
//! ```text
//! # mod1.py
//! from external_location import External
//! class Local: ...
//!
//! # mod2.py
//! from mod1 import External as RenamedExternal
//! import mod1 as renamed_mod
//! class E: ...
//! ```
//!
//! In the context of `mod2.E`, `expand_name("RenamedExternal")` is
//! `"external_location.External"` and `expand_name("renamed_mod.Local")` is
//! `"mod1.Local"`.

use crate::model::{Docstring, EntityId};
use crate::system::System;

impl System {
    /// Map a single unqualified name to the best-known qualified name in
    /// this scope, without following the result. Returns the name itself
    /// when nothing is known.
    pub fn local_name_to_full_name(&self, scope: EntityId, name: &str) -> String {
        if let Some(child) = self[scope].child(name) {
            return self.full_name(child);
        }
        if let Some(target) = self[scope].aliases().and_then(|a| a.get(name)) {
            return target.clone();
        }
        if self[scope].kind.is_module() {
            // The module is the outermost lexical scope.
            return name.to_string();
        }
        match self[scope].parent {
            Some(parent) => self.local_name_to_full_name(parent, name),
            None => name.to_string(),
        }
    }

    /// Whether the head segment of `name` is bound directly in this scope
    /// (owned child or local alias), without consulting enclosing scopes.
    pub(crate) fn is_locally_bound(&self, scope: EntityId, name: &str) -> bool {
        let head = name.split('.').next().unwrap_or(name);
        self[scope].child(head).is_some()
            || self[scope].aliases().is_some_and(|a| a.contains_key(head))
    }

    /// Whether `name` can be loaded in the context of `scope`.
    ///
    /// Only the head segment of a dotted name is checked. Class scopes defer
    /// to their module (class bodies do not nest lexically); module scopes
    /// never recurse outward.
    pub fn is_name_defined(&self, scope: EntityId, name: &str) -> bool {
        let entity = &self[scope];
        if entity.kind.is_module() || entity.kind.is_class() {
            if self.is_locally_bound(scope, name) {
                return true;
            }
            if entity.kind.is_module() {
                return false;
            }
            return self.is_name_defined(self.module_of(scope), name);
        }
        match entity.parent {
            Some(parent) => self.is_name_defined(parent, name),
            None => false,
        }
    }

    /// Return a fully qualified name for the possibly-dotted `name` in the
    /// context of `scope`.
    ///
    /// Never fails: an unresolvable segment stops the walk and the
    /// unresolved suffix is appended verbatim to the best-known prefix.
    pub fn expand_name(&self, scope: EntityId, name: &str) -> String {
        let parts: Vec<&str> = name.split('.').collect();
        let mut obj = scope;
        let mut full_name = String::new();
        let mut consumed = 0;
        for (i, part) in parts.iter().enumerate() {
            full_name = self.local_name_to_full_name(obj, part);
            consumed = i;
            if full_name == *part && i != 0 {
                // The local name was not found. For a class scope, try the
                // inherited members before giving up.
                if self[obj].kind.is_class() {
                    if let Some(inherited) = self.find_in_class(obj, part) {
                        full_name = self.full_name(inherited);
                    }
                }
                if full_name == *part {
                    // No full name; synthesize from the anchor and stop.
                    full_name = format!("{}.{}", self.full_name(obj), part);
                    break;
                }
            }
            match self.lookup(&full_name) {
                Some(next) => obj = next,
                None => break,
            }
        }
        let mut result = full_name;
        for part in &parts[consumed + 1..] {
            result.push('.');
            result.push_str(part);
        }
        result
    }

    /// Like [`System::expand_name`] but gives precedence to the module
    /// scope when a name is defined both locally and at module level, which
    /// is how annotations are scoped.
    pub fn expand_annotation_name(&self, scope: EntityId, name: &str) -> String {
        let module = self.module_of(scope);
        if self.is_name_defined(module, name) {
            return self.expand_name(module, name);
        }
        if self.is_name_defined(scope, name) {
            return self.expand_name(scope, name);
        }
        self.expand_name(module, name)
    }

    /// Return the entity named by `name` in this context, if any is known.
    pub fn resolve_name(&self, scope: EntityId, name: &str) -> Option<EntityId> {
        self.lookup(&self.expand_name(scope, name))
    }

    /// Look up a member in a class and its base classes, in MRO order.
    pub fn find_in_class(&self, class: EntityId, name: &str) -> Option<EntityId> {
        for base in self.mro_entities(class, true) {
            if let Some(member) = self[base].child(name) {
                return Some(member);
            }
        }
        None
    }

    // ========================================================================
    // Alias binding
    // ========================================================================

    /// Bind a local alias `name → target` in a scope.
    ///
    /// `guarded` bindings model alternate control-flow branches
    /// (conditionals, exception handlers): the first binding for a name
    /// wins and later guarded bindings for already-bound names are ignored.
    /// This is a deliberate approximation, not dataflow analysis.
    pub fn bind_alias(&mut self, scope: EntityId, name: &str, target: &str, guarded: bool) {
        if guarded && self.is_locally_bound(scope, name) {
            tracing::debug!(
                name,
                scope = %self.full_name(scope),
                "not overriding existing binding from an alternate branch"
            );
            return;
        }
        match self[scope].aliases_mut() {
            Some(aliases) => {
                aliases.insert(name.to_string(), target.to_string());
            }
            None => tracing::debug!(
                name,
                scope = %self.full_name(scope),
                "scope cannot hold import aliases"
            ),
        }
    }

    // ========================================================================
    // Documentation sources
    // ========================================================================

    /// Entities that can be considered as a source of documentation for
    /// this one, best first.
    ///
    /// A plain entity yields only itself. A function or attribute nested in
    /// a class yields itself first, then the same-named member of each MRO
    /// ancestor of the class, in MRO order. The first entry with a
    /// non-empty docstring wins.
    pub fn doc_sources(&self, id: EntityId) -> Vec<EntityId> {
        let mut sources = vec![id];
        let Some(parent) = self[id].parent else {
            return sources;
        };
        if !self[parent].kind.is_class() {
            return sources;
        }
        if !(self[id].kind.is_function() || self[id].kind.is_attribute()) {
            return sources;
        }
        for ancestor in self.mro_entities(parent, false) {
            if let Some(member) = self[ancestor].child(&self[id].name) {
                sources.push(member);
            }
        }
        sources
    }

    /// Fetch the docstring for an entity, considering inherited sources.
    ///
    /// Returns `(docstring, source)`; an empty docstring counts as
    /// "documented as empty" and stops the search with `(None, source)`.
    pub fn get_docstring(&self, id: EntityId) -> (Option<&Docstring>, Option<EntityId>) {
        for source in self.doc_sources(id) {
            if let Some(doc) = &self[source].docstring {
                if doc.text.is_empty() {
                    return (None, Some(source));
                }
                return (Some(doc), Some(source));
            }
        }
        (None, None)
    }
}
