pub mod chat_stream;
pub mod config;
pub mod conversation;
pub mod error;
pub mod export;
pub mod ids;
pub mod message;
pub mod orchestrator;
pub mod persistence;
pub mod relay;
pub mod session;
pub mod stream_decoder;
