//! The tool-use loop of Stepweave.
//!
//! A `react` workflow step hands its rendered prompt to a [`ReactAgent`],
//! which follows a **Thought → Action → Observation** cycle:
//!
//! 1. **Ask** the backend for a four-key JSON reply
//! 2. **Validate** it (one re-prompt if it is not valid JSON)
//! 3. **If final answer**: stop and return it
//! 4. **If action**: invoke the named tool, record the observation, loop
//! 5. **If neither**: stop with reason `no action`
//!
//! The loop continues until one of those stops or the iteration budget runs
//! out. Progress is reported through the run's `EventSink`.

pub mod payload;
pub mod react;

#[cfg(test)]
mod test_helpers;

pub use payload::{ReactPayload, Reply, parse_reply};
pub use react::{DEFAULT_MAX_ITERS, ReactAgent, ReactOutcome};
