//! # Stepweave Core
//!
//! Domain types, traits, and error definitions for the Stepweave workflow
//! engine. This crate has **no framework dependencies**: it defines the
//! seams (model backend, tools, template rendering, run events) that every
//! other crate implements against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here. Implementations live in their
//! respective crates. This enables:
//! - Swapping the model backend via configuration
//! - Testing the engine with scripted/mock backends and in-process tools
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod provider;
pub mod template;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{BackendError, Error, Result, TemplateError, ToolError};
pub use event::{EventSink, LoopNote, RunEvent, StopReason};
pub use provider::{GenerateOptions, Generation, GenerationMode, ModelBackend, Usage};
pub use template::{TemplateRenderer, safe_get};
pub use tool::{FnTool, Tool, ToolInfo, ToolRegistry};
