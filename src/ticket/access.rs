//! Who may do what to a ticket.

use crate::db::{Panel, Ticket};
use crate::error::{Denied, TicketError, TicketResult};
use crate::platform::{RoleId, UserId};

/// The user behind an interaction, with the standing needed for access checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub roles: Vec<RoleId>,
    pub is_admin: bool,
}

impl Actor {
    pub fn new(user_id: UserId, roles: Vec<RoleId>, is_admin: bool) -> Self {
        Self {
            user_id,
            roles,
            is_admin,
        }
    }

    /// Holder of one of the panel's support roles, or an administrator.
    pub fn is_staff(&self, panel: &Panel) -> bool {
        self.is_admin || panel.has_support_role(&self.roles)
    }

    pub fn require_staff(&self, panel: &Panel) -> TicketResult<()> {
        if self.is_staff(panel) {
            Ok(())
        } else {
            Err(TicketError::PermissionDenied(Denied::StaffOnly))
        }
    }

    pub fn require_owner_or_staff(&self, panel: &Panel, ticket: &Ticket) -> TicketResult<()> {
        if ticket.owner_id == self.user_id || self.is_staff(panel) {
            Ok(())
        } else {
            Err(TicketError::PermissionDenied(Denied::OwnerOrStaff))
        }
    }

    pub fn require_owner(&self, ticket: &Ticket) -> TicketResult<()> {
        if ticket.owner_id == self.user_id {
            Ok(())
        } else {
            Err(TicketError::PermissionDenied(Denied::OwnerOnly))
        }
    }

    pub fn require_admin(&self) -> TicketResult<()> {
        if self.is_admin {
            Ok(())
        } else {
            Err(TicketError::PermissionDenied(Denied::AdminOnly))
        }
    }
}
