//! CLI command implementations.

pub mod cache;
pub mod common;
pub mod config;
pub mod fetch;
pub mod info;
pub mod preinstall;
pub mod thumbnail;
