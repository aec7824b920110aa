// Expose modules for testing
pub mod cli;
pub mod consumer;
pub mod domain;
pub mod driver;
pub mod preflight;
pub mod profiling;
pub mod symbolization;
