//! Persistent UI controls.
//!
//! Every button the bot posts carries one of a fixed set of identifiers that
//! does not depend on the message it sits on. A control posted by a previous
//! process therefore routes correctly after a restart: dispatch parses the
//! identifier into a [`ControlId`] and never needs per-message state.

use crate::db::{Panel, Ticket};
use crate::platform::{Button, ButtonStyle, Embed, OutgoingMessage, RoleId, UserId, colors};
use std::fmt;
use std::str::FromStr;
use tracing::info;

/// A persistent control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlId {
    CreateTicket,
    CloseTicket,
    ClaimTicket,
    ReopenTicket,
    DeleteTicket,
    ConfirmClose,
}

impl ControlId {
    pub const ALL: [ControlId; 6] = [
        ControlId::CreateTicket,
        ControlId::CloseTicket,
        ControlId::ClaimTicket,
        ControlId::ReopenTicket,
        ControlId::DeleteTicket,
        ControlId::ConfirmClose,
    ];

    /// The stable interaction identifier.
    pub fn custom_id(self) -> &'static str {
        match self {
            ControlId::CreateTicket => "persistent:create_ticket",
            ControlId::CloseTicket => "persistent:close_ticket",
            ControlId::ClaimTicket => "persistent:claim_ticket",
            ControlId::ReopenTicket => "persistent:reopen_ticket",
            ControlId::DeleteTicket => "persistent:delete_ticket",
            ControlId::ConfirmClose => "persistent:confirm_close_ticket",
        }
    }

    /// Metric/log label.
    pub fn label(self) -> &'static str {
        match self {
            ControlId::CreateTicket => "create",
            ControlId::CloseTicket => "close",
            ControlId::ClaimTicket => "claim",
            ControlId::ReopenTicket => "reopen",
            ControlId::DeleteTicket => "delete",
            ControlId::ConfirmClose => "confirm_close",
        }
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.custom_id())
    }
}

/// Identifier that is not one of ours.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownControl(pub String);

impl FromStr for ControlId {
    type Err = UnknownControl;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ControlId::ALL
            .into_iter()
            .find(|c| c.custom_id() == s)
            .ok_or_else(|| UnknownControl(s.to_string()))
    }
}

/// The set of controls registered at process start.
///
/// Built once; registration is idempotent because identifiers are fixed.
#[derive(Debug, Clone)]
pub struct ControlRegistry {
    controls: Vec<ControlId>,
}

impl ControlRegistry {
    pub fn register_all() -> Self {
        let controls = ControlId::ALL.to_vec();
        info!(count = controls.len(), "Registered persistent controls");
        Self { controls }
    }

    pub fn resolve(&self, custom_id: &str) -> Option<ControlId> {
        custom_id
            .parse::<ControlId>()
            .ok()
            .filter(|c| self.controls.contains(c))
    }
}

/// Which control set a message displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// Panel entry point.
    EntryPoint,
    /// Ticket is open; `claimable` adds the claim control.
    Open { claimable: bool },
    Closed,
    CloseRequest,
}

impl ViewKind {
    pub fn buttons(self, create_label: &str) -> Vec<Button> {
        match self {
            ViewKind::EntryPoint => vec![button(
                ControlId::CreateTicket,
                create_label,
                ButtonStyle::Primary,
                None,
            )],
            ViewKind::Open { claimable } => {
                let mut buttons = vec![button(
                    ControlId::CloseTicket,
                    "Close",
                    ButtonStyle::Danger,
                    Some('🔒'),
                )];
                if claimable {
                    buttons.push(button(
                        ControlId::ClaimTicket,
                        "Claim",
                        ButtonStyle::Secondary,
                        Some('🙋'),
                    ));
                }
                buttons
            }
            ViewKind::Closed => vec![
                button(ControlId::ReopenTicket, "Re-Open", ButtonStyle::Success, Some('🔓')),
                button(ControlId::DeleteTicket, "Delete", ButtonStyle::Danger, Some('🗑')),
            ],
            ViewKind::CloseRequest => vec![button(
                ControlId::ConfirmClose,
                "Close Ticket",
                ButtonStyle::Danger,
                None,
            )],
        }
    }
}

fn button(control: ControlId, label: &str, style: ButtonStyle, emoji: Option<char>) -> Button {
    Button {
        custom_id: control.custom_id(),
        label: label.to_string(),
        style,
        emoji,
    }
}

// ============================================================================
// Messages
// ============================================================================

/// The panel's entry-point message.
pub fn entry_point(panel: &Panel) -> OutgoingMessage {
    OutgoingMessage::embed(
        Embed::new(colors::GREEN)
            .title(panel.name.clone())
            .description(panel.description()),
    )
    .with_buttons(ViewKind::EntryPoint.buttons(panel.button_text()))
}

/// First message in a fresh ticket channel.
pub fn welcome(panel: &Panel, owner: UserId) -> OutgoingMessage {
    let mut mentions = vec![owner.mention()];
    mentions.extend(panel.support_roles.iter().map(|r: &RoleId| r.mention()));

    OutgoingMessage::embed(
        Embed::new(colors::DARK_GREEN)
            .title("Welcome to your ticket!")
            .description(panel.welcome_message()),
    )
    .with_content(mentions.join(" "))
    .with_buttons(
        ViewKind::Open {
            claimable: panel.claimable,
        }
        .buttons(""),
    )
}

/// Replacement for the control message after a close.
pub fn closed(closed_by: UserId) -> OutgoingMessage {
    OutgoingMessage::embed(
        Embed::new(colors::RED)
            .title("Ticket Closed")
            .description(format!("Ticket closed by {}.", closed_by.mention())),
    )
    .with_buttons(ViewKind::Closed.buttons(""))
}

/// Replacement for the control message after a reopen.
pub fn reopened(panel: &Panel, reopened_by: UserId) -> OutgoingMessage {
    OutgoingMessage::embed(
        Embed::new(colors::GREEN)
            .title("Ticket Re-Opened")
            .description(format!("Ticket re-opened by {}.", reopened_by.mention())),
    )
    .with_buttons(
        ViewKind::Open {
            claimable: panel.claimable,
        }
        .buttons(""),
    )
}

pub fn close_request(owner: UserId) -> OutgoingMessage {
    OutgoingMessage::embed(
        Embed::new(colors::BLURPLE).title("Close Request").description(format!(
            "Hi {}, has your issue been resolved? If so, you may close this ticket by pressing the button below.",
            owner.mention()
        )),
    )
    .with_buttons(ViewKind::CloseRequest.buttons(""))
}

pub fn transcript_notice(ticket: &Ticket) -> String {
    format!(
        "Transcript for ticket `#{}` created by {}",
        ticket.number(),
        ticket.owner_id.mention()
    )
}

pub fn delete_notice(delay_secs: u64) -> OutgoingMessage {
    OutgoingMessage::embed(
        Embed::new(colors::RED).description(format!(
            "This ticket will be deleted in {delay_secs} seconds."
        )),
    )
}

pub fn help() -> Embed {
    Embed::new(colors::BLURPLE)
        .title("Ticket Tool Commands")
        .field("/setup", "Creates a new ticket panel.", false)
        .field("/editpanel `panel`", "Edits an existing ticket panel.", false)
        .field("/panels", "Lists the ticket panels of this server.", false)
        .field(
            "Ticket Management Commands",
            "These can only be used inside a ticket channel.",
            false,
        )
        .field("/add `user|role`", "Gives a user or role access to the ticket.", true)
        .field("/remove `user|role`", "Removes a user or role's access to the ticket.", true)
        .field("/open", "Re-opens a closed ticket.", true)
        .field("/close", "Closes the current ticket.", true)
        .field("/rename `name`", "Changes the ticket channel name.", true)
        .field("/claim", "Claims or unclaims the ticket.", true)
        .field(
            "/closerequest",
            "Asks the ticket owner to confirm the ticket can be closed.",
            true,
        )
        .field("/transcript", "Generates a transcript of the ticket.", true)
}
