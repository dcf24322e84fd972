pub mod commands;
pub mod gemini;
pub mod media;
pub mod middleware;
pub mod state;
pub mod telegram;
pub mod webhook;
