//! Furigana annotation service.
//!
//! Annotates Japanese text with ruby readings via an LLM and keeps a local
//! history of past submissions.

pub mod annotate;
pub mod config;
pub mod history;
pub mod llm;
pub mod sanitize;
pub mod server;
