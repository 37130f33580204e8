//! Example resource group deployment CLI.
//!
//! Runs a declaring program, provisions it against an in-memory cloud and
//! prints the stack exports as JSON.
//!
//! # Usage
//!
//! ```bash
//! resource-group [resource-group|storage]
//! ```
//!
//! # Environment
//!
//! - `STRATUM_PROJECT`, `STRATUM_STACK`, `STRATUM_PARALLELISM`: run configuration
//! - `STRATUM_LOG`, `STRATUM_LOG_FORMAT`, `STRATUM_LOG_SPANS`: logging
//! - `STRATUM_RG_QUOTA`: resource group quota, `0` forces a provider failure
//!
//! Variables are also read from a `.env` file.

use example::{ExampleError, InMemoryCloud, RESOURCE_GROUP, TracingConfig, deploy, program_by_name};
use stratum_graph::RunConfig;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    TracingConfig::from_env().init();

    if let Err(e) = run().await {
        report(&e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), ExampleError> {
    let name = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "resource-group".to_string());
    let program = program_by_name(&name)?;
    let config = RunConfig::from_env()?;

    let mut cloud = InMemoryCloud::new();
    if let Some(quota) = std::env::var("STRATUM_RG_QUOTA")
        .ok()
        .and_then(|q| q.trim().parse().ok())
    {
        cloud = cloud.with_quota(RESOURCE_GROUP, quota);
    }

    let (summary, outputs) = deploy(config, program, &cloud).await?;
    tracing::info!(
        created = summary.created,
        failed = summary.failed,
        skipped = summary.skipped,
        "deployment summary"
    );

    for (export, err) in outputs.failures() {
        tracing::error!(export, %err, "export failed");
    }
    print_outputs(&outputs.to_json());

    let count = outputs.failures().count();
    if count > 0 {
        return Err(ExampleError::FailedExports { count });
    }
    Ok(())
}

#[expect(clippy::print_stdout, reason = "exports are the program's output")]
fn print_outputs(outputs: &serde_json::Value) {
    match serde_json::to_string_pretty(outputs) {
        Ok(rendered) => println!("{rendered}"),
        Err(_) => println!("{outputs}"),
    }
}

#[expect(clippy::print_stderr, reason = "fatal errors go to stderr")]
fn report(err: &ExampleError) {
    eprintln!("Error: {err}");
}
