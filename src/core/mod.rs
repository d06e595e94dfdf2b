//! Core translation engine module

pub mod catalog;
pub mod config;
pub mod cost;
pub mod documents;
pub mod errors;
pub mod estimator;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod summary;
