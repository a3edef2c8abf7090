//! Cross-module scenarios driving the full pipeline: discovery-less string
//! modules, a scripted producer, processing, and post-processing.

use docgraph_core::report::Reporter;
use docgraph_python::model::{EntityInit, ProcessingState};
use docgraph_python::{BuildError, EntityKind, Producer, System, SystemOptions};

fn captured_system() -> System {
    System::with_reporter(SystemOptions::default(), Reporter::with_capture())
}

// ============================================================================
// Circular imports
// ============================================================================

/// Two modules importing each other:
///
/// ```text
/// # a.py                      # b.py
/// from b import B             from a import A
/// class A: ...                class B: ...
/// ```
struct CircularProducer;

impl Producer for CircularProducer {
    fn build_module(
        &mut self,
        system: &mut System,
        module: docgraph_python::EntityId,
    ) -> Result<(), BuildError> {
        match system.full_name(module).as_str() {
            "a" => {
                // `from b import B` forces b to be built first.
                let _ = system.get_processed_module("b", self);
                system.bind_alias(module, "B", "b.B", false);
                system.add_entity(EntityInit::new("A", EntityKind::Class, Some(module)));
            }
            "b" => {
                // `from a import A` re-enters a while it is mid-build; the
                // partially built module is returned as-is.
                let a = system.get_processed_module("a", self).unwrap();
                assert_eq!(system[a].state(), ProcessingState::Processing);
                assert_eq!(system[a].child("A"), None);
                system.bind_alias(module, "A", "a.A", false);
                system.add_entity(EntityInit::new("B", EntityKind::Class, Some(module)));
            }
            other => panic!("unexpected module {other}"),
        }
        Ok(())
    }
}

#[test]
fn test_circular_imports_terminate_and_resolve() {
    let mut system = captured_system();
    let a = system.add_module_string("", "a", None, false).unwrap();
    let b = system.add_module_string("", "b", None, false).unwrap();
    system.process(&mut CircularProducer);

    assert_eq!(system[a].state(), ProcessingState::Processed);
    assert_eq!(system[b].state(), ProcessingState::Processed);
    assert!(system.is_post_processed());

    // Both directions resolve once the graph is complete.
    let class_a = system.lookup("a.A").unwrap();
    let class_b = system.lookup("b.B").unwrap();
    assert_eq!(system.resolve_name(b, "A"), Some(class_a));
    assert_eq!(system.resolve_name(a, "B"), Some(class_b));
}

// ============================================================================
// Cross-module inheritance with forward references
// ============================================================================

/// `sub` is built before `base` even exists in built form:
///
/// ```text
/// # sub.py                    # base.py
/// import base                 class Base:
/// class Sub(base.Base): ...       attr = None  # instance var in __init__
/// ```
struct InheritanceProducer;

impl Producer for InheritanceProducer {
    fn build_module(
        &mut self,
        system: &mut System,
        module: docgraph_python::EntityId,
    ) -> Result<(), BuildError> {
        match system.full_name(module).as_str() {
            "sub" => {
                system.bind_alias(module, "base", "base", false);
                let sub = system.add_entity(EntityInit::new("Sub", EntityKind::Class, Some(module)));
                system.add_base(sub, "base.Base", "base.Base");
                system.add_entity(EntityInit::new(
                    "attr",
                    EntityKind::ClassVariable,
                    Some(sub),
                ));
            }
            "base" => {
                let base =
                    system.add_entity(EntityInit::new("Base", EntityKind::Class, Some(module)));
                let attr = system.add_entity(EntityInit::new(
                    "attr",
                    EntityKind::InstanceVariable,
                    Some(base),
                ));
                system.set_docstring(attr, "the attribute", 3);
            }
            other => panic!("unexpected module {other}"),
        }
        Ok(())
    }
}

#[test]
fn test_forward_reference_across_modules() {
    let mut system = captured_system();
    system.add_module_string("", "sub", None, false).unwrap();
    system.add_module_string("", "base", None, false).unwrap();
    system.process(&mut InheritanceProducer);

    let sub = system.lookup("sub.Sub").unwrap();
    let base = system.lookup("base.Base").unwrap();
    assert_eq!(system.mro_entities(sub, true), vec![sub, base]);
    assert_eq!(system.subclasses(base), &[sub]);

    // The inherited source is found through the MRO, and the inherited
    // instance-variable kind promotes the subclass attribute.
    let sub_attr = system.lookup("sub.Sub.attr").unwrap();
    let base_attr = system.lookup("base.Base.attr").unwrap();
    assert_eq!(system.doc_sources(sub_attr), vec![sub_attr, base_attr]);
    let (doc, source) = system.get_docstring(sub_attr);
    assert_eq!(doc.unwrap().text, "the attribute");
    assert_eq!(source, Some(base_attr));
    assert_eq!(system[sub_attr].kind, EntityKind::InstanceVariable);
}

// ============================================================================
// Malformed input degrades to a partial module
// ============================================================================

struct FailingProducer;

impl Producer for FailingProducer {
    fn build_module(
        &mut self,
        system: &mut System,
        module: docgraph_python::EntityId,
    ) -> Result<(), BuildError> {
        match system.full_name(module).as_str() {
            "broken" => {
                // Partial content built before the parse failure surfaces.
                system.add_entity(EntityInit::new("early", EntityKind::Function, Some(module)));
                Err(BuildError::Parse {
                    path: "broken.py".to_string(),
                    message: "unexpected indent".to_string(),
                })
            }
            _ => {
                system.add_entity(EntityInit::new("ok", EntityKind::Function, Some(module)));
                Ok(())
            }
        }
    }
}

#[test]
fn test_build_failure_keeps_partial_content_and_rest_of_graph() {
    let mut system = captured_system();
    let broken = system.add_module_string("", "broken", None, false).unwrap();
    let fine = system.add_module_string("", "fine", None, false).unwrap();
    system.process(&mut FailingProducer);

    // The failing module is marked processed with its partial content.
    assert_eq!(system[broken].state(), ProcessingState::Processed);
    assert!(system.lookup("broken.early").is_some());
    let reports = system.reporter().captured_in("parsing");
    assert_eq!(reports.len(), 1);
    assert!(reports[0].message.contains("unexpected indent"));

    // The rest of the graph is unaffected.
    assert_eq!(system[fine].state(), ProcessingState::Processed);
    assert!(system.lookup("fine.ok").is_some());
}

// ============================================================================
// Duplicates stay reachable in a full traversal
// ============================================================================

#[test]
fn test_duplicate_entities_are_both_traversable() {
    let mut system = captured_system();
    let module = system.add_entity(EntityInit::new("A", EntityKind::Module, None));
    system.add_entity(EntityInit::new("m", EntityKind::Function, Some(module)));
    system.add_entity(EntityInit::new("m", EntityKind::Function, Some(module)));

    let names: Vec<&str> = system.all_objects().map(|(name, _)| name).collect();
    assert!(names.contains(&"A.m"));
    assert!(names.contains(&"A.m 0"));
}

// ============================================================================
// Reparenting across modules
// ============================================================================

#[test]
fn test_reparent_then_find_object_round_trip() {
    let mut system = captured_system();
    let src = system.add_entity(EntityInit::new("src", EntityKind::Module, None));
    let dst = system.add_entity(EntityInit::new("dst", EntityKind::Module, None));
    let class = system.add_entity(EntityInit::new("X", EntityKind::Class, Some(src)));
    let child = system.add_entity(EntityInit::new("y", EntityKind::Function, Some(class)));

    system.reparent(class, dst, "Renamed").unwrap();

    assert_eq!(system.lookup("dst.Renamed"), Some(class));
    assert_eq!(system.lookup("dst.Renamed.y"), Some(child));
    assert_eq!(system.lookup("src.X"), None);
    // The stale qualified name round-trips through the breadcrumb alias.
    assert_eq!(system.find_object("src.X").unwrap(), Some(class));
    assert_eq!(system.find_object("src.X.y").unwrap(), Some(child));
    // And the new name is what resolution produces from the old scope.
    assert_eq!(system.expand_name(src, "X.y"), "dst.Renamed.y");
}
