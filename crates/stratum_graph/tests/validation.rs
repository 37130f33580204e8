//! Tests for graph validation.
//!
//! These tests verify what `GraphBuilder::finalize()` and `Program::run()`
//! reject before any engine sees the graph:
//! - Duplicate logical names
//! - Self and mutual reference cycles
//! - Dangling late-bound references and explicit dependencies
//! - Error display formatting

use stratum_graph::prelude::*;

fn builder() -> GraphBuilder {
    GraphBuilder::new(RunConfig::new("validation"))
}

// ─────────────────────────────────────────────────────────────────────────────
// Duplicate Names
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn duplicate_name_fails_run() {
    let result = Program::new(RunConfig::new("validation")).run(|ctx| {
        ctx.declare("rg", "t", Inputs::new())?;
        ctx.declare("vpc", "t", Inputs::new())?;
        ctx.declare("rg", "other", Inputs::new().set("x", 1))?;
        Ok::<_, GraphError>(())
    });

    assert_eq!(
        result.unwrap_err(),
        GraphError::DuplicateName {
            name: "rg".to_string()
        }
    );
}

#[test]
fn same_name_in_separate_runs_is_allowed() {
    let program = Program::new(RunConfig::new("validation"));
    for _ in 0..2 {
        let deployment = program
            .run(|ctx| {
                ctx.declare("rg", "t", Inputs::new())?;
                Ok::<_, GraphError>(())
            })
            .unwrap();
        assert_eq!(deployment.graph().len(), 1);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Cycles
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn self_reference_is_a_cycle() {
    let mut builder = builder();
    let own_id = builder.reference("loop", "id");
    builder
        .declare("loop", "t", Inputs::new().set("self", own_id))
        .unwrap();

    assert_eq!(
        builder.finalize().unwrap_err(),
        GraphError::CycleDetected {
            resources: vec!["loop".to_string()]
        }
    );
}

#[test]
fn mutual_reference_is_a_cycle() {
    let mut builder = builder();
    let b_name = builder.reference("b", "name");
    let a = builder
        .declare("a", "t", Inputs::new().set("peer", b_name))
        .unwrap();
    builder
        .declare("b", "t", Inputs::new().set("name", "b").set("peer", a.id()))
        .unwrap();

    let err = builder.finalize().unwrap_err();
    assert_eq!(
        err,
        GraphError::CycleDetected {
            resources: vec!["a".to_string(), "b".to_string()]
        }
    );
}

#[test]
fn explicit_dependency_can_close_a_cycle() {
    let mut builder = builder();
    let a = builder
        .declare_with("a", "t", Inputs::new(), DeclareOptions::new().depends_on("c"))
        .unwrap();
    let b = builder
        .declare("b", "t", Inputs::new().set("a", a.id()))
        .unwrap();
    builder
        .declare("c", "t", Inputs::new().set("b", b.id()))
        .unwrap();
    builder.declare("unrelated", "t", Inputs::new()).unwrap();

    assert_eq!(
        builder.finalize().unwrap_err(),
        GraphError::CycleDetected {
            resources: vec!["a".to_string(), "b".to_string(), "c".to_string()]
        }
    );
}

#[test]
fn cycle_fails_program_run() {
    let result = Program::new(RunConfig::new("validation")).run(|ctx| {
        let later = ctx.reference("second", "id");
        let first = ctx.declare("first", "t", Inputs::new().set("dep", later))?;
        ctx.declare("second", "t", Inputs::new().set("dep", first.id()))?;
        ctx.export("first", first.id())?;
        Ok::<_, GraphError>(())
    });

    assert!(matches!(result, Err(GraphError::CycleDetected { .. })));
}

// ─────────────────────────────────────────────────────────────────────────────
// Dangling References
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn reference_to_undeclared_resource_fails() {
    let mut builder = builder();
    let ghost = builder.reference("ghost", "id");
    builder
        .declare("app", "t", Inputs::new().set("dep", ghost))
        .unwrap();

    assert_eq!(
        builder.finalize().unwrap_err(),
        GraphError::UnknownResource {
            name: "ghost".to_string(),
            referenced_by: "ghost.id".to_string(),
        }
    );
}

#[test]
fn reference_to_missing_attribute_fails() {
    let mut builder = builder();
    let endpoint = builder.reference("db", "endpoint");
    builder
        .declare("app", "t", Inputs::new().set("db", endpoint))
        .unwrap();
    builder
        .declare("db", "t", Inputs::new().set("size", "small"))
        .unwrap();

    assert_eq!(
        builder.finalize().unwrap_err(),
        GraphError::UnknownAttribute {
            resource: "db".to_string(),
            attribute: "endpoint".to_string(),
        }
    );
}

#[test]
fn schema_output_satisfies_reference() {
    let mut builder = builder();
    builder.register_schema(ResourceSchema::new("cloud:Database").with_output("endpoint"));
    let endpoint = builder.reference("db", "endpoint");
    builder
        .declare("app", "t", Inputs::new().set("db", endpoint))
        .unwrap();
    builder.declare("db", "cloud:Database", Inputs::new()).unwrap();

    assert!(builder.finalize().is_ok());
}

#[test]
fn unknown_explicit_dependency_fails() {
    let mut builder = builder();
    builder
        .declare_with("app", "t", Inputs::new(), DeclareOptions::new().depends_on("db"))
        .unwrap();

    assert_eq!(
        builder.finalize().unwrap_err(),
        GraphError::UnknownResource {
            name: "db".to_string(),
            referenced_by: "app".to_string(),
        }
    );
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Display
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn error_messages_name_the_resources() {
    let cases = [
        (
            GraphError::DuplicateName {
                name: "rg".to_string(),
            },
            "resource 'rg' is already declared",
        ),
        (
            GraphError::CycleDetected {
                resources: vec!["a".to_string(), "b".to_string()],
            },
            "dependency cycle detected between resources: a, b",
        ),
        (
            GraphError::UnknownResource {
                name: "db".to_string(),
                referenced_by: "app".to_string(),
            },
            "resource 'db' referenced by 'app' is not declared",
        ),
        (
            GraphError::DuplicateExport {
                name: "id".to_string(),
            },
            "export 'id' is already registered",
        ),
    ];

    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}
