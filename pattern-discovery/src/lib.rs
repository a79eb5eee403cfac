// Knowledge base access (specs and prompt templates)
pub mod store;

// Prompt composition
pub mod composer;

// Local rate-limit bookkeeping
pub mod rate_limit;

// External tool process supervision
pub mod supervisor;

// Analysis orchestration
pub mod analyzer;

// Terminal output
pub mod report;

// Layered configuration
pub mod config;

// Command-line arguments
pub mod cli;

// Command dispatch
pub mod app;
