//! Unified error handling for ticketd.
//!
//! Every ticket or panel operation ends in a [`TicketResult`]. Errors are
//! recovered at the operation boundary: they carry a static code for metrics
//! labeling and a user-visible reply, and never take the process down.

use crate::db::DbError;
use crate::platform::{ChannelId, PlatformError, RoleId};
use thiserror::Error;

// ============================================================================
// Operation Errors
// ============================================================================

/// Something the operation needed could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Missing {
    /// The clicked entry point no longer belongs to a panel.
    Panel,
    /// No panel with this id in the guild.
    PanelId(i64),
    /// The channel is not a ticket channel.
    Ticket,
    Role(RoleId),
    Category(ChannelId),
    Channel(ChannelId),
}

/// The actor is not allowed to perform the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denied {
    /// Requires a support role or administrator.
    StaffOnly,
    /// Requires the ticket owner, a support role, or administrator.
    OwnerOrStaff,
    /// Only the ticket owner may confirm a close request.
    OwnerOnly,
    AdminOnly,
    /// Claims can only be released by their holder.
    NotClaimant,
}

/// A guard was violated; informational, not a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// The requester already holds an open ticket on this panel.
    AlreadyOpen { channel: Option<ChannelId> },
    AlreadyClosed,
    /// Reopen on a ticket that is not closed.
    NotClosed,
    /// Reopening would give the owner a second open ticket on the panel.
    OwnerHasOpenTicket,
    NotClaimable,
    /// Claims are only held on open tickets.
    TicketClosed,
    NotClaimed,
    InvalidName(String),
    /// A panel needs at least one support role.
    NoSupportRoles,
    NothingToUpdate,
}

/// Errors that can occur during ticket and panel operations.
#[derive(Debug, Error)]
pub enum TicketError {
    #[error("not found: {0:?}")]
    NotFound(Missing),

    #[error("permission denied: {0:?}")]
    PermissionDenied(Denied),

    #[error("conflict: {0:?}")]
    Conflict(Conflict),

    #[error("platform side effect failed: {0}")]
    Provisioning(#[from] PlatformError),

    #[error("store error: {0}")]
    Database(DbError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<DbError> for TicketError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::PanelNotFound(id) => TicketError::NotFound(Missing::PanelId(id)),
            DbError::TicketNotFound(_) => TicketError::NotFound(Missing::Ticket),
            DbError::OpenTicketExists(_) => {
                TicketError::Conflict(Conflict::AlreadyOpen { channel: None })
            }
            other => TicketError::Database(other),
        }
    }
}

impl TicketError {
    /// Get a static error code string for metrics labeling.
    #[inline]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Conflict(_) => "conflict",
            Self::Provisioning(_) => "provisioning_failure",
            Self::Database(_) => "database_error",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Whether this is an unexpected fault rather than a guarded outcome.
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Internal(_))
    }

    /// Reply shown to the actor. Faults get a generic message.
    pub fn user_message(&self) -> String {
        match self {
            Self::NotFound(missing) => match missing {
                Missing::Panel => "This ticket panel is outdated.".to_string(),
                Missing::PanelId(id) => format!("No panel with id `{id}` exists in this server."),
                Missing::Ticket => "This command can only be used in a ticket channel.".to_string(),
                Missing::Role(role) => format!(
                    "Configuration error: support role {} not found.",
                    role.mention()
                ),
                Missing::Category(category) => {
                    format!("Configuration error: category `{category}` not found.")
                }
                Missing::Channel(channel) => {
                    format!("Configuration error: channel {} not found.", channel.mention())
                }
            },
            Self::PermissionDenied(denied) => match denied {
                Denied::StaffOnly => "You do not have permission to use this command.".to_string(),
                Denied::OwnerOrStaff => {
                    "Only the ticket owner or staff members can close this ticket.".to_string()
                }
                Denied::OwnerOnly => "Only the ticket owner can use this button.".to_string(),
                Denied::AdminOnly => "Only administrators can manage ticket panels.".to_string(),
                Denied::NotClaimant => "Only the staff member holding the claim can release it.".to_string(),
            },
            Self::Conflict(conflict) => match conflict {
                Conflict::AlreadyOpen { channel: Some(channel) } => format!(
                    "You already have an open ticket from this panel: {}",
                    channel.mention()
                ),
                Conflict::AlreadyOpen { channel: None } => {
                    "You already have an open ticket from this panel.".to_string()
                }
                Conflict::AlreadyClosed => "This is not an open ticket.".to_string(),
                Conflict::NotClosed => "This is not a closed ticket.".to_string(),
                Conflict::OwnerHasOpenTicket => {
                    "The ticket owner already has another open ticket from this panel.".to_string()
                }
                Conflict::NotClaimable => {
                    "This ticket panel does not support claiming.".to_string()
                }
                Conflict::TicketClosed => "Closed tickets cannot be claimed.".to_string(),
                Conflict::NotClaimed => "This ticket is not claimed.".to_string(),
                Conflict::InvalidName(reason) => format!("Invalid name: {reason}"),
                Conflict::NoSupportRoles => "A panel needs at least one support role.".to_string(),
                Conflict::NothingToUpdate => "Nothing to update.".to_string(),
            },
            Self::Provisioning(PlatformError::Forbidden(_)) => {
                "I lack the permissions needed to do that here.".to_string()
            }
            Self::Provisioning(_) => {
                "The platform rejected the request. Please try again later.".to_string()
            }
            Self::Database(_) | Self::Internal(_) => {
                "Something went wrong. Please try again later.".to_string()
            }
        }
    }
}

/// Result type for ticket and panel operations.
pub type TicketResult<T> = Result<T, TicketError>;
