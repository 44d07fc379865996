//! `stepweave stream` — Run a workflow, printing each event as a JSON line.
//!
//! Ctrl-C cancels the run; the stream then ends with `cancelled`.

use std::sync::Arc;
use std::time::Duration;

use stepweave_core::event::RunEvent;
use stepweave_workflow::{NextEvent, RunBridge};

use super::{RunArgs, prepare};

pub async fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let prepared = prepare(&args)?;
    let poll = Duration::from_millis(prepared.config.gateway.poll_interval_ms);
    let bridge = RunBridge::new(Arc::new(prepared.runner))
        .with_event_buffer(prepared.config.gateway.event_buffer);

    let mut run = bridge.start(prepared.workflow);
    let run_id = run.run_id.clone();
    let mut cancel_sent = false;
    let mut failure = None;

    loop {
        let next = tokio::select! {
            next = run.next_event(poll) => next,
            _ = tokio::signal::ctrl_c(), if !cancel_sent => {
                eprintln!("Cancelling run {run_id}...");
                bridge.cancel(&run_id);
                cancel_sent = true;
                continue;
            }
        };

        match next {
            NextEvent::Event(event) => {
                println!("{}", serde_json::to_string(&event)?);
                if let RunEvent::Error { error } = &event {
                    failure = Some(error.clone());
                }
                if event.is_terminal() {
                    break;
                }
            }
            NextEvent::Idle => tracing::debug!(run_id = %run_id, "Waiting for events"),
            NextEvent::Closed => break,
        }
    }

    match failure {
        Some(error) => Err(format!("Run failed: {error}").into()),
        None => Ok(()),
    }
}
