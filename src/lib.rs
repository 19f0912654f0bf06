//! Betting decision engine.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod api;
pub mod config;
pub mod odds;
pub mod storage;
pub mod strategy;
pub mod timing;
pub mod types;
