//! Network module.
//!
//! Contains the Gateway (serenity event handler) and the slash command
//! wire conversions.

mod commands;
mod gateway;

pub use gateway::Gateway;
