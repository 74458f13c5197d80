//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

// =============================================================================
// Discord Defaults
// =============================================================================

pub fn default_token_env() -> String {
    "DISCORD_TOKEN".to_string()
}

// =============================================================================
// Database Defaults
// =============================================================================

pub fn default_database_path() -> String {
    "db/tickets.db".to_string()
}

// =============================================================================
// Ticket Defaults
// =============================================================================

/// Notice period before a deleted ticket's channel is destroyed.
pub fn default_delete_delay_secs() -> u64 {
    5
}

/// Age after which a ticket row that never got its channel is purged.
pub fn default_stale_provision_secs() -> u64 {
    300
}
