//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Config struct definitions (Config, DiscordConfig, TicketsConfig, ...)
//! - [`defaults`]: serde default value functions
//! - [`validation`]: startup checks that collect every problem at once

mod defaults;
mod types;
pub mod validation;

pub use types::{Config, TicketsConfig};
