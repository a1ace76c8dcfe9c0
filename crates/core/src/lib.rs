pub mod common;
pub mod config;
pub mod context;
pub mod engine;
pub mod market;
pub mod persist;
pub mod risk;
pub mod signal;
