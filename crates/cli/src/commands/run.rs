//! `stepweave run` — Run a workflow and print the final memory.

use stepweave_core::event::EventSink;

use super::{RunArgs, prepare};

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let prepared = prepare(&args)?;
    tracing::info!(
        backend = prepared.runner.backend_name(),
        steps = prepared.workflow.steps.len(),
        "Running workflow"
    );

    let output = prepared
        .runner
        .run(&prepared.workflow, &EventSink::disabled())
        .await?;

    println!("{}", serde_json::to_string_pretty(&output.memory)?);
    Ok(())
}
