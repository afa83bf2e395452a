pub mod accumulator;
pub mod analyzer;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod error;
pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod tracker;
pub mod types;
