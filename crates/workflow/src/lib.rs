//! Workflow engine for Stepweave.
//!
//! A workflow is a list of steps sharing one memory. Each step renders a
//! prompt template against that memory, asks the model backend (or runs the
//! tool-use loop), and writes its result back under named keys for the steps
//! that follow.
//!
//! - [`model`]: the JSON workflow definition
//! - [`template`]: the `{{ ... }}` prompt template language
//! - [`pipeline`]: sequential step execution
//! - [`bridge`]: background runs with event streaming and cancellation

pub mod bridge;
pub mod model;
pub mod pipeline;
pub mod template;

pub use bridge::{CancelOutcome, NextEvent, RunBridge, RunRegistry, StreamingRun};
pub use model::{BUNDLED_WORKFLOW, ParserKind, StepSpec, WorkflowDefinition};
pub use pipeline::{Memory, RunOutput, WorkflowRunner};
pub use template::TemplateEngine;
