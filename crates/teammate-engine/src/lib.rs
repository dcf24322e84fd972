//! Conversational context engine: what the bot remembers, what it shows the
//! model, and how it reads the model's answer.

pub mod config;
pub mod history;
pub mod ingest;
pub mod interpreter;
pub mod memory;
pub mod prompt;
