//! vbox-sweeper - A Linux cleanup service for leftover VirtualBox artifacts
//!
//! This crate provides functionality for:
//! - Watching VM runtime and daemon processes and reacting to their exit
//! - Discovering VM homes and leftover log directories across mounted drives
//! - Securely deleting drag-and-drop temp folders and product log files

pub mod cleaner;
pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod scanner;
pub mod service;
pub mod util;

// Re-export commonly used types
pub use config::Config;
pub use error::{Result, SweepError};
