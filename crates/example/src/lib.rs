//! Example resource group deployment built with Stratum.
//!
//! This example declares a resource group whose name is derived from the
//! stack, exports its provider-assigned ID and name, and provisions it
//! against an in-memory cloud. A second program chains an object storage
//! instance and a bucket onto the group to show dependency ordering.
//!
//! # Flow
//!
//! ```text
//! ┌─────────┐   ┌──────────┐   ┌────────────────────┐   ┌─────────┐
//! │ Program │──▶│ Finalize │──▶│ DeploymentExecutor │──▶│ Exports │
//! └─────────┘   └──────────┘   └────────────────────┘   └─────────┘
//!  declares      orders and     provisions through       settle and
//!  resources     validates      InMemoryCloud            render JSON
//! ```

pub mod cloud;
pub mod telemetry;

pub use cloud::InMemoryCloud;
pub use telemetry::{TracingConfig, TracingFormat};

use serde_json::Value;
use stratum_graph::prelude::*;

/// Type tag of a resource group.
pub const RESOURCE_GROUP: &str = "ibmcloud:index/resourceGroup:ResourceGroup";
/// Type tag of a service instance.
pub const RESOURCE_INSTANCE: &str = "ibmcloud:index/resourceInstance:ResourceInstance";
/// Type tag of an object storage bucket.
pub const COS_BUCKET: &str = "ibmcloud:index/cosBucket:CosBucket";

/// Errors surfaced by the example binary.
#[derive(Debug, thiserror::Error)]
pub enum ExampleError {
    /// The configuration or the declared graph was rejected.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// The executor could not drive the deployment.
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Some exports failed to settle.
    #[error("{count} export(s) failed")]
    FailedExports {
        /// Number of failed exports.
        count: usize,
    },

    /// The requested program does not exist.
    #[error("unknown program '{0}', expected one of: resource-group, storage")]
    UnknownProgram(String),
}

/// Computed outputs of the resource types used here.
#[must_use]
pub fn schemas() -> Vec<ResourceSchema> {
    vec![
        ResourceSchema::new(RESOURCE_GROUP)
            .with_output("crn")
            .with_output("state"),
        ResourceSchema::new(RESOURCE_INSTANCE)
            .with_output("crn")
            .with_output("state"),
        ResourceSchema::new(COS_BUCKET).with_output("crn"),
    ]
}

/// A resource group named after the stack, exporting its ID and name.
///
/// # Errors
///
/// Returns a [`GraphError`] if a declaration or export is rejected.
pub fn resource_group(ctx: &mut Context) -> Result<(), GraphError> {
    let name = format!("pulumi-example-rg-{}", ctx.stack());
    let rg = ctx.declare("rg", RESOURCE_GROUP, Inputs::new().set("name", name))?;

    ctx.export("resourceGroupId", rg.id())?;
    ctx.export("resourceGroupName", echoed(&rg, "name"))?;
    Ok(())
}

/// A resource group, an object storage instance inside it, and a bucket.
///
/// # Errors
///
/// Returns a [`GraphError`] if a declaration or export is rejected.
pub fn storage(ctx: &mut Context) -> Result<(), GraphError> {
    let stack = ctx.stack().to_string();
    let rg = ctx.declare(
        "rg",
        RESOURCE_GROUP,
        Inputs::new().set("name", format!("storage-rg-{stack}")),
    )?;

    let cos = ctx.declare(
        "cos",
        RESOURCE_INSTANCE,
        Inputs::new()
            .set("name", format!("storage-cos-{stack}"))
            .set("service", "cloud-object-storage")
            .set("plan", "standard")
            .set("location", "global")
            .set("resourceGroupId", rg.id()),
    )?;

    let bucket_name = rg.id().map(|id| {
        Value::from(format!(
            "bucket-{}",
            id.as_str().unwrap_or_default().replace(':', "-")
        ))
    });
    let bucket = ctx.declare(
        "bucket",
        COS_BUCKET,
        Inputs::new()
            .set("bucketName", bucket_name)
            .set("resourceInstanceId", echoed(&cos, "crn"))
            .set("region", "us-south")
            .set("storageClass", "smart"),
    )?;

    ctx.export("resourceGroupId", rg.id())?;
    ctx.export("cosCrn", echoed(&cos, "crn"))?;
    ctx.export("bucketName", echoed(&bucket, "bucketName"))?;
    ctx.export(
        "endpoint",
        echoed(&bucket, "region").map(|region| {
            Value::from(format!(
                "s3.{}.stratum.local",
                region.as_str().unwrap_or_default()
            ))
        }),
    )?;
    Ok(())
}

/// A declaring procedure.
pub type ProgramFn = fn(&mut Context) -> Result<(), GraphError>;

/// Looks up a program by name.
///
/// # Errors
///
/// Returns [`ExampleError::UnknownProgram`] for anything but `resource-group`
/// and `storage`.
pub fn program_by_name(name: &str) -> Result<ProgramFn, ExampleError> {
    match name {
        "resource-group" => Ok(resource_group),
        "storage" => Ok(storage),
        other => Err(ExampleError::UnknownProgram(other.to_string())),
    }
}

/// Runs a program, provisions it against `cloud`, and collects its exports.
///
/// # Errors
///
/// Returns the graph or execution error that stopped the run.
pub async fn deploy<F>(
    config: RunConfig,
    program: F,
    cloud: &InMemoryCloud,
) -> Result<(DeploymentSummary, StackOutputs), ExampleError>
where
    F: FnOnce(&mut Context) -> Result<(), GraphError>,
{
    let deployment = Program::new(config).with_schemas(schemas()).run(program)?;
    tracing::info!(
        run_id = %deployment.run_id(),
        resources = deployment.graph().len(),
        "program finished"
    );

    let summary = DeploymentExecutor::new()
        .execute(&deployment, cloud)
        .await?;
    let outputs = deployment.exports().collect().await;
    Ok((summary, outputs))
}

fn echoed(handle: &ResourceHandle, attribute: &str) -> OutputCell<Value> {
    handle
        .output(attribute)
        .unwrap_or_else(|| OutputCell::failed(CellError::missing_attribute(attribute)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> RunConfig {
        RunConfig::new("pulumi-example").with_stack("dev")
    }

    #[tokio::test]
    async fn resource_group_exports_id_and_name() {
        let cloud = InMemoryCloud::new();
        let (summary, outputs) = deploy(config(), resource_group, &cloud).await.unwrap();

        assert_eq!(summary.created, 1);
        assert_eq!(
            outputs.to_json(),
            json!({
                "resourceGroupId": "resourcegroup-0000",
                "resourceGroupName": "pulumi-example-rg-dev",
            })
        );
    }

    #[tokio::test]
    async fn quota_failure_fails_every_group_export() {
        let cloud = InMemoryCloud::new().with_quota(RESOURCE_GROUP, 0);
        let (summary, outputs) = deploy(config(), resource_group, &cloud).await.unwrap();

        assert_eq!(summary.failed, 1);
        let failed: Vec<&str> = outputs.failures().map(|(name, _)| name).collect();
        assert_eq!(failed, vec!["resourceGroupId", "resourceGroupName"]);
        assert!(cloud.inventory().is_empty());
    }

    #[tokio::test]
    async fn storage_is_provisioned_in_dependency_order() {
        let cloud = InMemoryCloud::new();
        let (summary, outputs) = deploy(config(), storage, &cloud).await.unwrap();

        assert!(summary.is_success());
        let order: Vec<String> = cloud.inventory().into_iter().map(|r| r.urn).collect();
        assert!(order[0].ends_with("::rg"));
        assert!(order[1].ends_with("::cos"));
        assert!(order[2].ends_with("::bucket"));

        let json = outputs.to_json();
        assert_eq!(json["bucketName"], json!("bucket-resourcegroup-0000"));
        assert_eq!(
            json["cosCrn"],
            json!("crn:v1:stratum:resourceinstance:resourceinstance-0001")
        );
        assert_eq!(json["endpoint"], json!("s3.us-south.stratum.local"));
    }

    #[test]
    fn unknown_program_is_rejected() {
        assert!(program_by_name("storage").is_ok());
        assert!(matches!(
            program_by_name("vpc"),
            Err(ExampleError::UnknownProgram(name)) if name == "vpc"
        ));
    }
}
