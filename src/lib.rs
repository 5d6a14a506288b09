//! allm is a multi-panel chat client for locally hosted OpenAI-compatible
//! servers such as LM Studio.
//!
//! The crate is organized around a small set of collaborating layers:
//! - [`core`] owns per-panel sessions, conversation history, the streaming
//!   pipeline, the brainstorm relay between panels, and persistence.
//! - [`api`] defines the chat and model-list payloads exchanged with the
//!   server, plus the model-list fetch.
//! - [`cli`] implements the headless subcommands that drive the core.
//! - [`utils`] holds URL helpers and logging setup.
//!
//! The binary (`src/main.rs`) routes straight through [`crate::cli::main`].

pub mod api;
pub mod cli;
pub mod core;
pub mod utils;
