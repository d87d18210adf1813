//! Select files from a local folder, assemble them with instructions and
//! templates into an LLM prompt, and apply structured file changes back.

// Declare all modules as public so they can be used by the binary and tests.
pub mod app;
pub mod config;
pub mod core;
pub mod utils;
