//! CLI module for the e621-noapi dataset builder
//!
//! This module is only available when the "cli" feature is enabled.

mod config;
#[path = "main.rs"]
mod main_impl;

pub use main_impl::{main, Cli, CliCropStrategy, CliOutputFormat};
