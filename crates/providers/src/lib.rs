//! Model backend implementations for Stepweave.
//!
//! All backends implement the `stepweave_core::ModelBackend` trait.
//! The router selects the correct backend based on configuration.

pub mod echo;
pub mod mock;
pub mod openai_compat;
pub mod router;
pub mod scripted;

pub use echo::EchoBackend;
pub use mock::MockBackend;
pub use openai_compat::OpenAiCompatBackend;
pub use router::{build_from_config, build_named};
pub use scripted::{RecordedCall, ScriptedBackend, ScriptedReply};
