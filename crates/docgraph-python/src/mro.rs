//! Method Resolution Order computation using C3 linearization.
//!
//! The MRO decides which ancestor's member wins under multiple inheritance.
//! Computation is global and runs only in post-processing, because base
//! classes may live in modules that were not yet built (or are circularly
//! dependent) while a class statement is visited.
//!
//! Two phases:
//!
//! 1. **Base finalize** — re-resolve every raw base that did not resolve at
//!    visit time, now that the whole graph exists. A class appearing as its
//!    own ancestor during this walk is a hard anomaly: it is reported and
//!    the class gets the plain depth-first ancestor listing instead of a
//!    merge.
//! 2. **Merge** — classes are ordered topologically (no-base classes
//!    first), so every class's bases already have their MRO when its own is
//!    merged: `mro(C) = [C] + merge(mro(B1), ..., mro(Bn), [B1..Bn])`.
//!
//! Unresolved bases participate as bare expanded names: they contribute no
//! linearization of their own but keep their position in the result.

use std::collections::{BTreeMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use thiserror::Error;

use docgraph_core::report::Severity;

use crate::model::{ClassOrName, EntityId, RawBase};
use crate::system::System;

/// Qualified name of the marker base used purely for generic
/// parameterization. When it appears both as a direct base and inside
/// another base's MRO, it is dropped from the direct-bases list before
/// merging to avoid a spurious linearization conflict.
const SHARED_GENERIC_BASE: &str = "typing.Generic";

// ============================================================================
// Errors
// ============================================================================

/// Errors from inheritance linearization.
#[derive(Debug, Error)]
pub enum LinearizationError {
    /// A class appears as its own ancestor.
    #[error("cycle found while computing inheritance hierarchy: {chain}")]
    Cycle { chain: String },

    /// No valid C3 merge exists.
    #[error("cannot compute linearization of {class_name:?}")]
    Inconsistent { class_name: String },
}

// ============================================================================
// C3 merge
// ============================================================================

/// C3 merge for combining linearizations.
///
/// Repeatedly take the head of the first sequence that does not appear in
/// the tail of any other sequence, remove it from all heads, and repeat.
/// Returns `None` when no valid head exists (inconsistent hierarchy).
///
/// The output is deterministic: it depends only on the input sequences.
pub fn c3_merge(mut seqs: Vec<Vec<ClassOrName>>) -> Option<Vec<ClassOrName>> {
    let mut result = Vec::new();

    loop {
        seqs.retain(|seq| !seq.is_empty());

        if seqs.is_empty() {
            return Some(result);
        }

        // Find a candidate that doesn't appear in the tail of any sequence.
        let mut candidate = None;
        for seq in &seqs {
            let head = &seq[0];
            let in_tail = seqs.iter().any(|s| s.len() > 1 && s[1..].contains(head));
            if !in_tail {
                candidate = Some(head.clone());
                break;
            }
        }

        let cand = candidate?;

        result.push(cand.clone());
        for seq in &mut seqs {
            if seq.first() == Some(&cand) {
                seq.remove(0);
            }
        }
    }
}

// ============================================================================
// Base bookkeeping and queries
// ============================================================================

impl System {
    /// Record a base class reference on a class, as written.
    ///
    /// The name is expanded in the class's enclosing scope and resolved
    /// best-effort right away; bases that cannot be resolved yet (forward
    /// references, circular imports) are re-resolved in post-processing.
    pub fn add_base(&mut self, class: EntityId, name: &str, expr: &str) {
        let scope = self[class].parent.unwrap_or(class);
        let expanded = self.expand_name(scope, name);
        let base_object = self
            .lookup(&expanded)
            .filter(|&base| self[base].kind.is_class());
        if let Some(details) = self[class].class_mut() {
            details.raw_bases.push(RawBase {
                name: name.to_string(),
                expr: expr.to_string(),
            });
            details.initial_bases.push(expanded);
            details.initial_base_objects.push(base_object);
        }
    }

    /// All resolved ancestors of a class, depth-first over the declaration
    /// order. Does not comply with the MRO; cycle-safe.
    pub fn all_bases(&self, class: EntityId, include_self: bool) -> Vec<EntityId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        self.collect_bases(class, include_self, &mut seen, &mut out);
        out
    }

    fn collect_bases(
        &self,
        class: EntityId,
        emit_self: bool,
        seen: &mut HashSet<EntityId>,
        out: &mut Vec<EntityId>,
    ) {
        if !seen.insert(class) {
            return;
        }
        if emit_self {
            out.push(class);
        }
        let bases: Vec<EntityId> = match self[class].class() {
            Some(details) => details.base_objects().iter().flatten().copied().collect(),
            None => return,
        };
        for base in bases {
            self.collect_bases(base, true, seen, out);
        }
    }

    /// The method resolution order of a class.
    ///
    /// The definitive value exists only after post-processing; before that
    /// the depth-first ancestor listing is returned instead. With
    /// `include_external`, unresolved bases appear as their expanded names.
    pub fn mro(
        &self,
        class: EntityId,
        include_external: bool,
        include_self: bool,
    ) -> Vec<ClassOrName> {
        let Some(details) = self[class].class() else {
            return Vec::new();
        };
        let mut mro: Vec<ClassOrName> = match &details.mro {
            Some(mro) => mro.clone(),
            None => self
                .all_bases(class, true)
                .into_iter()
                .map(ClassOrName::Class)
                .collect(),
        };
        if !include_external {
            mro.retain(|entry| matches!(entry, ClassOrName::Class(_)));
        }
        if !include_self && !mro.is_empty() {
            mro.remove(0);
        }
        mro
    }

    /// Resolved classes of the MRO, excluding unresolved names.
    pub fn mro_entities(&self, class: EntityId, include_self: bool) -> Vec<EntityId> {
        self.mro(class, false, include_self)
            .into_iter()
            .filter_map(|entry| match entry {
                ClassOrName::Class(id) => Some(id),
                ClassOrName::Name(_) => None,
            })
            .collect()
    }

    /// Classes that list this class among their resolved bases. Populated
    /// only during post-processing; empty (never authoritative) before.
    pub fn subclasses(&self, class: EntityId) -> &[EntityId] {
        self[class]
            .class()
            .map(|details| details.subclasses.as_slice())
            .unwrap_or(&[])
    }
}

// ============================================================================
// Hierarchy finalizer
// ============================================================================

/// Post-processing driver for class hierarchies: finalizes base objects,
/// then computes every MRO in topological order.
pub(crate) struct HierarchyFinalizer {
    /// Dependency graph: class → resolved-or-name bases. Classes whose
    /// finalize walk hit a cycle are excluded. `BTreeMap` keeps graph
    /// construction, and with it report order, deterministic.
    graph: BTreeMap<EntityId, Vec<ClassOrName>>,
    /// Finished MROs; unresolved names always linearize to nothing.
    computed: BTreeMap<EntityId, Vec<ClassOrName>>,
}

impl HierarchyFinalizer {
    /// Finalize base objects for every class and build the dependency
    /// graph for the ones that did not hit a cycle.
    pub(crate) fn new(system: &mut System, classes: &[EntityId]) -> HierarchyFinalizer {
        let mut finalizer = HierarchyFinalizer {
            graph: BTreeMap::new(),
            computed: BTreeMap::new(),
        };
        for &class in classes {
            match Self::finalize_base_objects(system, class, Vec::new()) {
                Err(err) => {
                    // Set the MRO right away for cycles; they must not be
                    // part of the dependency graph.
                    system.report_for(class, "mro", err.to_string(), Severity::Violation);
                    let fallback: Vec<ClassOrName> = system
                        .all_bases(class, true)
                        .into_iter()
                        .map(ClassOrName::Class)
                        .collect();
                    if let Some(details) = system[class].class_mut() {
                        details.mro = Some(fallback.clone());
                    }
                    finalizer.computed.insert(class, fallback);
                }
                Ok(()) => {
                    let bases = Self::bases_or_names(system, class);
                    finalizer.graph.insert(class, bases);
                }
            }
        }
        finalizer
    }

    /// Base objects are computed in two passes: the producer sets the
    /// initial objects at visit time, and this walk re-resolves the rest
    /// now that the graph is complete, recursing through superclasses.
    fn finalize_base_objects(
        system: &mut System,
        class: EntityId,
        mut path: Vec<EntityId>,
    ) -> Result<(), LinearizationError> {
        if let Some(pos) = path.iter().position(|&p| p == class) {
            let chain: Vec<String> = path[pos..]
                .iter()
                .chain(std::iter::once(&class))
                .map(|&c| system.full_name(c))
                .collect();
            return Err(LinearizationError::Cycle {
                chain: chain.join(" -> "),
            });
        }
        path.push(class);

        let Some(details) = system[class].class() else {
            return Ok(());
        };
        if details.final_base_objects.is_some() {
            // Already computed, skip.
            return Ok(());
        }
        if details.raw_bases.is_empty() {
            return Ok(());
        }

        let raw_names: Vec<String> = details.raw_bases.iter().map(|b| b.name.clone()).collect();
        let initial_bases = details.initial_bases.clone();
        let initial_objects = details.initial_base_objects.clone();
        let scope = system[class].parent;

        let mut final_objects: Vec<Option<EntityId>> = Vec::new();
        let mut final_bases: Vec<String> = Vec::new();
        let mut recurse: Vec<EntityId> = Vec::new();
        for (i, initial) in initial_objects.iter().enumerate() {
            let mut base = *initial;
            if base.is_none() {
                // Only re-resolve when the visit-time resolution failed.
                if let Some(scope) = scope {
                    base = system
                        .resolve_name(scope, &raw_names[i])
                        .filter(|&b| system[b].kind.is_class());
                }
            }
            match base {
                Some(resolved) => {
                    final_objects.push(Some(resolved));
                    final_bases.push(system.full_name(resolved));
                    recurse.push(resolved);
                }
                None => {
                    final_objects.push(None);
                    final_bases.push(initial_bases[i].clone());
                }
            }
        }
        for base in recurse {
            Self::finalize_base_objects(system, base, path.clone())?;
        }
        if let Some(details) = system[class].class_mut() {
            details.final_base_objects = Some(final_objects);
            details.final_bases = Some(final_bases);
        }
        Ok(())
    }

    /// The finalized bases of a class, falling back to the expanded name
    /// where a base did not resolve to a class.
    fn bases_or_names(system: &System, class: EntityId) -> Vec<ClassOrName> {
        let Some(details) = system[class].class() else {
            return Vec::new();
        };
        details
            .base_objects()
            .iter()
            .zip(details.bases())
            .map(|(object, name)| match object {
                Some(id) => ClassOrName::Class(*id),
                None => ClassOrName::Name(name.clone()),
            })
            .collect()
    }

    /// Compute every MRO, bases before subclasses.
    pub(crate) fn compute_mros(&mut self, system: &mut System) {
        let mut dependencies = DiGraphMap::<EntityId, ()>::new();
        for (&class, bases) in &self.graph {
            dependencies.add_node(class);
            for base in bases {
                if let ClassOrName::Class(b) = base {
                    dependencies.add_edge(class, *b, ());
                }
            }
        }
        let Ok(order) = toposort(&dependencies, None) else {
            // Cycles were filtered out when the graph was built.
            system.reporter_mut().report(
                "mro",
                "inheritance graph unexpectedly cyclic after cycle filtering",
                Severity::Violation,
            );
            return;
        };
        for class in order.into_iter().rev() {
            if self.computed.contains_key(&class) || !self.graph.contains_key(&class) {
                continue;
            }
            let mro = self.compute_mro(system, class);
            if let Some(details) = system[class].class_mut() {
                details.mro = Some(mro.clone());
            }
            self.computed.insert(class, mro);
        }
    }

    /// Merge one class. All of its bases' MROs are already in `computed`
    /// thanks to the topological order.
    fn compute_mro(&self, system: &mut System, class: EntityId) -> Vec<ClassOrName> {
        let mut result = vec![ClassOrName::Class(class)];
        let mut bases = self.graph[&class].clone();
        if bases.is_empty() {
            return result;
        }

        let mut seqs: Vec<Vec<ClassOrName>> = bases
            .iter()
            .map(|base| match base {
                ClassOrName::Class(id) => self.computed.get(id).cloned().unwrap_or_default(),
                ClassOrName::Name(_) => Vec::new(),
            })
            .collect();

        // A generic marker base shared between several bases' MROs would
        // make every merge fail; drop it from the direct-bases list.
        let generic = match system.lookup(SHARED_GENERIC_BASE) {
            Some(id) => ClassOrName::Class(id),
            None => ClassOrName::Name(SHARED_GENERIC_BASE.to_string()),
        };
        if bases.contains(&generic) && seqs.iter().any(|mro| mro.contains(&generic)) {
            bases.retain(|base| base != &generic);
        }
        seqs.push(bases);

        match c3_merge(seqs) {
            Some(merged) => {
                result.extend(merged);
                result
            }
            None => {
                let err = LinearizationError::Inconsistent {
                    class_name: system.full_name(class),
                };
                system.report_for(class, "mro", err.to_string(), Severity::Violation);
                system
                    .all_bases(class, true)
                    .into_iter()
                    .map(ClassOrName::Class)
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(n: &str) -> ClassOrName {
        ClassOrName::Name(n.to_string())
    }

    // ========================================================================
    // C3 merge
    // ========================================================================

    #[test]
    fn test_merge_empty_input() {
        assert_eq!(c3_merge(Vec::new()), Some(Vec::new()));
    }

    #[test]
    fn test_merge_single_inheritance() {
        // C(B), B(A): merge([B, A], [B]) = [B, A]
        let merged = c3_merge(vec![vec![name("B"), name("A")], vec![name("B")]]).unwrap();
        assert_eq!(merged, vec![name("B"), name("A")]);
    }

    #[test]
    fn test_merge_diamond() {
        // Classic diamond:
        //     A
        //    / \
        //   B   C
        //    \ /
        //     D
        let merged = c3_merge(vec![
            vec![name("B"), name("A")],
            vec![name("C"), name("A")],
            vec![name("B"), name("C")],
        ])
        .unwrap();
        assert_eq!(merged, vec![name("B"), name("C"), name("A")]);
    }

    #[test]
    fn test_merge_preserves_declaration_order() {
        let merged = c3_merge(vec![
            vec![name("A")],
            vec![name("B")],
            vec![name("A"), name("B")],
        ])
        .unwrap();
        assert_eq!(merged, vec![name("A"), name("B")]);
    }

    #[test]
    fn test_merge_inconsistent_hierarchy() {
        // Two bases demanding opposite orders.
        let merged = c3_merge(vec![
            vec![name("A"), name("B")],
            vec![name("B"), name("A")],
            vec![name("A"), name("B")],
        ]);
        assert_eq!(merged, None);
    }

    #[test]
    fn test_merge_is_deterministic() {
        let input = || {
            vec![
                vec![name("B"), name("A")],
                vec![name("C"), name("A")],
                vec![name("B"), name("C")],
            ]
        };
        assert_eq!(c3_merge(input()), c3_merge(input()));
    }
}
