//! Tests for the graph builder API.
//!
//! These tests verify:
//! - Handles expose pending cells for `id`, echoed inputs and schema outputs
//! - Dependency edges are derived from cells nested anywhere in the inputs
//! - Independent builders do not observe each other


use serde_json::json;
use stratum_graph::prelude::*;
use test_utils::order;

#[test]
fn handle_cells_start_pending() {
    let mut builder = GraphBuilder::new(RunConfig::new("builder"));
    let bucket = builder
        .declare(
            "bucket",
            "cloud:Bucket",
            Inputs::new().set("region", "us-south").set("versioned", true),
        )
        .unwrap();

    assert_eq!(
        bucket.attributes().collect::<Vec<_>>(),
        vec!["id", "region", "versioned"]
    );
    for attribute in ["id", "region", "versioned"] {
        assert!(bucket.output(attribute).unwrap().state().is_pending());
    }
    assert_eq!(bucket.resource_id(), ResourceId::new(0));
    assert_eq!(bucket.attribute_ref("region").to_string(), "bucket.region");
}

#[test]
fn nested_and_derived_cells_create_edges() {
    let deployment = Program::new(RunConfig::new("builder"))
        .run(|ctx| {
            let rg = ctx.declare("rg", "cloud:Group", Inputs::new().set("name", "rg"))?;
            let vpc = ctx.declare("vpc", "cloud:Vpc", Inputs::new().set("group", rg.id()))?;
            let zone = ctx.declare("zone", "cloud:Zone", Inputs::new())?;

            let cidr = vpc.id().map(|id| json!(format!("{}/24", id.as_str().unwrap_or("0.0.0.0"))));
            ctx.declare(
                "subnet",
                "cloud:Subnet",
                Inputs::new()
                    .set("cidr", cidr)
                    .set("zones", vec![Input::Output(zone.id()), Input::Literal(json!("z2"))]),
            )?;
            Ok::<_, GraphError>(())
        })
        .unwrap();

    let subnet = deployment.graph().get("subnet").unwrap();
    assert_eq!(subnet.dependencies().collect::<Vec<_>>(), vec!["vpc", "zone"]);
    assert!(subnet.depends_on("zone"));
    assert!(!subnet.depends_on("rg"));

    let order = order(&deployment);
    let position = |name: &str| order.iter().position(|n| n == name).unwrap();
    assert!(position("rg") < position("vpc"));
    assert!(position("vpc") < position("subnet"));
    assert!(position("zone") < position("subnet"));
}

#[test]
fn typed_cells_are_lifted_into_inputs() {
    let mut builder = GraphBuilder::new(RunConfig::new("builder"));
    let rg = builder.declare("rg", "cloud:Group", Inputs::new()).unwrap();
    let port = rg.id().map(|_| 8080_u16);

    let app = builder
        .declare("app", "cloud:App", Inputs::new().set("port", port))
        .unwrap();
    builder
        .finalize()
        .map(|graph| {
            let app = graph.get(app.name()).unwrap();
            assert!(app.depends_on("rg"));
            assert!(!app.input("port").unwrap().is_known());
        })
        .unwrap();
}

#[test]
fn urns_follow_run_config() {
    let deployment = Program::new(RunConfig::new("infra").with_stack("prod"))
        .run(|ctx| {
            let rg = ctx.declare("rg", "cloud:Group", Inputs::new())?;
            assert_eq!(rg.urn().as_str(), "urn:stratum:prod::infra::cloud:Group::rg");
            Ok::<_, GraphError>(())
        })
        .unwrap();

    assert_eq!(deployment.config().stack(), "prod");
    assert!(deployment.run_id().to_string().starts_with("run_"));
}

#[test]
fn independent_builders_do_not_interfere() {
    let mut first = GraphBuilder::new(RunConfig::new("one"));
    let mut second = GraphBuilder::new(RunConfig::new("two"));

    first.declare("rg", "cloud:Group", Inputs::new()).unwrap();
    second.declare("rg", "cloud:Group", Inputs::new()).unwrap();
    second.declare("vpc", "cloud:Vpc", Inputs::new()).unwrap();

    assert_eq!(first.len(), 1);
    assert_eq!(second.len(), 2);
    assert!(!first.contains("vpc"));
}

#[test]
fn shared_reference_cells_are_the_same_slot() {
    let mut builder = GraphBuilder::new(RunConfig::new("builder"));
    let a = builder.reference("db", "id");
    let b = builder.reference("db", "id");
    let db = builder.declare("db", "cloud:Database", Inputs::new()).unwrap();

    assert!(a.ptr_eq(&b));
    assert!(a.ptr_eq(&db.id()));
    assert_eq!(builder.registry().len(), 1);
}
