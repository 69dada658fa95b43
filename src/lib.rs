//! Chatterbox - multi-platform AI chat agent core
//!
//! This library decides whether to answer chat messages, drives a bounded
//! tool-calling loop against a language model, keeps the user posted while
//! it works, and records billable usage for every model call.

pub mod agent;
pub mod billing;
pub mod catalog;
pub mod tools;
pub mod adapters;
pub mod config;
pub mod error;
pub mod ui;

pub use error::{Error, Result};
