//! Ticket lifecycle engine.
//!
//! A ticket moves `open -> closed -> open ...` until it is deleted. The engine
//! keeps no state of its own between operations: each operation re-reads the
//! store, checks the actor's standing, commits the transition with a single
//! guarded write, and only then performs platform side effects.
//!
//! The guarded write is what makes concurrent operations safe. Two closes
//! racing on the same ticket both pass their read, but only one
//! `UPDATE ... WHERE status <> 'closed'` changes a row; the other reports
//! [`Conflict::AlreadyClosed`] and produces no side effects. Ticket creation
//! relies on the partial unique index over open tickets in the same way.
//!
//! Side effects after a committed transition are best-effort: failures are
//! logged and counted but never undo the state change. The one exception is
//! channel provisioning, where the freshly inserted row is rolled back so the
//! owner is not locked out by a ticket without a channel.

pub mod access;
pub mod transcript;

pub use access::Actor;
pub use transcript::{StagedTranscript, TranscriptStager};

use crate::config::TicketsConfig;
use crate::db::{Database, DbError, Panel, Ticket, TicketStatus};
use crate::error::{Conflict, Denied, Missing, TicketError, TicketResult};
use crate::metrics;
use crate::platform::{
    Access, ChannelId, ChannelSpec, GuildId, MessageId, OutgoingMessage, Overwrite, Platform,
    PlatformError, Target, UserId,
};
use crate::telemetry::observe;
use crate::views;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Attempts at the claim compare-and-set before giving up.
const CLAIM_ATTEMPTS: usize = 3;

/// Longest channel name the platform accepts.
const MAX_CHANNEL_NAME: usize = 100;

/// Result of a claim request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    Unclaimed,
    /// Someone (possibly the requester) already holds the claim.
    HeldBy(UserId),
}

/// A freshly provisioned ticket.
#[derive(Debug, Clone)]
pub struct OpenedTicket {
    pub ticket: Ticket,
    pub channel_id: ChannelId,
}

/// Outcome of a close, including whether the transcript reached the archive.
#[derive(Debug, Clone)]
pub struct ClosedTicket {
    pub ticket: Ticket,
    pub transcript_delivered: bool,
}

/// Channel name for a ticket in the given status.
pub fn channel_name(status: TicketStatus, ticket: &Ticket) -> String {
    match status {
        TicketStatus::Open => format!("ticket-{}", ticket.number()),
        TicketStatus::Closed => format!("closed-{}", ticket.number()),
    }
}

/// Overwrites for a new ticket channel: hidden from everyone except the
/// owner, the panel's support roles, and the bot.
pub fn ticket_overwrites(panel: &Panel, owner: UserId, bot: UserId) -> Vec<Overwrite> {
    let mut overwrites = vec![
        Overwrite::new(Target::Everyone, Access::Hidden),
        Overwrite::new(Target::Member(owner), Access::ReadWrite),
    ];
    overwrites.extend(
        panel
            .support_roles
            .iter()
            .map(|role| Overwrite::new(Target::Role(*role), Access::ReadWrite)),
    );
    overwrites.push(Overwrite::new(Target::Member(bot), Access::View));
    overwrites
}

fn validate_name(name: &str) -> TicketResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(TicketError::Conflict(Conflict::InvalidName(
            "name cannot be empty".into(),
        )));
    }
    if name.chars().count() > MAX_CHANNEL_NAME {
        return Err(TicketError::Conflict(Conflict::InvalidName(format!(
            "name cannot exceed {MAX_CHANNEL_NAME} characters"
        ))));
    }
    Ok(name.to_string())
}

/// The ticket lifecycle state machine.
pub struct TicketEngine {
    db: Database,
    platform: Arc<dyn Platform>,
    transcripts: TranscriptStager,
    config: TicketsConfig,
}

impl TicketEngine {
    pub fn new(
        db: Database,
        platform: Arc<dyn Platform>,
        transcripts: TranscriptStager,
        config: TicketsConfig,
    ) -> Self {
        Self {
            db,
            platform,
            transcripts,
            config,
        }
    }

    /// Ticket and panel for a ticket channel.
    async fn load(&self, channel: ChannelId) -> TicketResult<(Ticket, Panel)> {
        let ticket = self
            .db
            .tickets()
            .find_by_channel(channel)
            .await?
            .ok_or(TicketError::NotFound(Missing::Ticket))?;
        let panel = self
            .db
            .panels()
            .find_by_id(ticket.panel_id)
            .await?
            .ok_or(TicketError::NotFound(Missing::PanelId(ticket.panel_id)))?;
        Ok((ticket, panel))
    }

    /// Log and count a failed best-effort side effect. Returns whether it succeeded.
    fn effect(&self, step: &'static str, channel: ChannelId, result: Result<(), PlatformError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(step, channel = %channel, error = %e, "Ticket side effect failed");
                metrics::record_side_effect_failure(step);
                false
            }
        }
    }

    /// Replace the message carrying the controls, or post a new one when the
    /// operation did not come from a message.
    async fn swap_controls(&self, channel: ChannelId, origin: Option<MessageId>, view: OutgoingMessage) {
        let result = match origin {
            Some(message) => self.platform.edit_message(channel, message, view).await,
            None => self.platform.send_message(channel, view).await.map(|_| ()),
        };
        self.effect("controls", channel, result);
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Open a ticket from a panel's entry point.
    pub async fn open_ticket(
        &self,
        guild: GuildId,
        entry_point: MessageId,
        requester: &Actor,
    ) -> TicketResult<OpenedTicket> {
        observe("create", async {
            let panel = self
                .db
                .panels()
                .find_by_message(entry_point)
                .await?
                .filter(|p| p.guild_id == guild)
                .ok_or(TicketError::NotFound(Missing::Panel))?;

            if let Some(existing) = self
                .db
                .tickets()
                .find_open(requester.user_id, panel.id)
                .await?
            {
                return Err(TicketError::Conflict(Conflict::AlreadyOpen {
                    channel: existing.channel_id,
                }));
            }

            for role in &panel.support_roles {
                if !self.platform.role_exists(guild, *role).await? {
                    return Err(TicketError::NotFound(Missing::Role(*role)));
                }
            }
            if !self.platform.category_exists(guild, panel.category_id).await? {
                return Err(TicketError::NotFound(Missing::Category(panel.category_id)));
            }

            // The partial unique index arbitrates between racing creates.
            let mut ticket = self
                .db
                .tickets()
                .create(guild, panel.id, requester.user_id)
                .await?;

            let spec = ChannelSpec {
                name: channel_name(TicketStatus::Open, &ticket),
                parent: panel.category_id,
                overwrites: ticket_overwrites(&panel, ticket.owner_id, self.platform.bot_user()),
            };
            let channel = match self.platform.create_channel(guild, spec).await {
                Ok(channel) => channel,
                Err(e) => {
                    self.rollback(&ticket).await;
                    return Err(e.into());
                }
            };

            if let Err(e) = self.db.tickets().set_channel(ticket.id, channel).await {
                if let Err(pe) = self.platform.delete_channel(channel).await {
                    error!(channel = %channel, error = %pe, "Failed to remove channel of rolled back ticket");
                }
                self.rollback(&ticket).await;
                return Err(e.into());
            }
            ticket.channel_id = Some(channel);

            if let Err(e) = self
                .platform
                .send_message(channel, views::welcome(&panel, ticket.owner_id))
                .await
            {
                self.effect("welcome", channel, Err(e));
            }

            info!(
                ticket = ticket.id,
                panel = panel.id,
                owner = %ticket.owner_id,
                channel = %channel,
                "Ticket opened"
            );
            Ok(OpenedTicket {
                ticket,
                channel_id: channel,
            })
        })
        .await
    }

    async fn rollback(&self, ticket: &Ticket) {
        metrics::record_rollback();
        match self.db.tickets().delete(ticket.id).await {
            Ok(_) => warn!(ticket = ticket.id, "Rolled back ticket after provisioning failure"),
            Err(e) => error!(ticket = ticket.id, error = %e, "Failed to roll back ticket row"),
        }
    }

    // ========================================================================
    // Close / Reopen
    // ========================================================================

    /// Close a ticket. Allowed for the owner and staff.
    ///
    /// `origin` is the message whose controls triggered the close; it is
    /// replaced by the closed-state controls.
    pub async fn close_ticket(
        &self,
        channel: ChannelId,
        actor: &Actor,
        origin: Option<MessageId>,
    ) -> TicketResult<ClosedTicket> {
        observe("close", async {
            let (ticket, panel) = self.load(channel).await?;
            actor.require_owner_or_staff(&panel, &ticket)?;
            self.close_loaded(ticket, panel, channel, actor, origin).await
        })
        .await
    }

    /// Owner's confirmation of a staff close request.
    pub async fn confirm_close(
        &self,
        channel: ChannelId,
        actor: &Actor,
        origin: Option<MessageId>,
    ) -> TicketResult<ClosedTicket> {
        observe("confirm_close", async {
            let (ticket, panel) = self.load(channel).await?;
            actor.require_owner(&ticket)?;
            self.close_loaded(ticket, panel, channel, actor, origin).await
        })
        .await
    }

    async fn close_loaded(
        &self,
        mut ticket: Ticket,
        panel: Panel,
        channel: ChannelId,
        actor: &Actor,
        origin: Option<MessageId>,
    ) -> TicketResult<ClosedTicket> {
        if !ticket.is_open() {
            return Err(TicketError::Conflict(Conflict::AlreadyClosed));
        }

        self.db
            .tickets()
            .set_status(ticket.id, TicketStatus::Closed)
            .await
            .map_err(|e| match e {
                DbError::StatusUnchanged(_) => TicketError::Conflict(Conflict::AlreadyClosed),
                other => other.into(),
            })?;
        ticket.status = TicketStatus::Closed;
        ticket.claimed_by = None;
        info!(ticket = ticket.id, by = %actor.user_id, "Ticket closed");

        let result = self
            .platform
            .rename_channel(channel, &channel_name(TicketStatus::Closed, &ticket))
            .await;
        self.effect("rename", channel, result);

        let result = self
            .platform
            .set_overwrite(
                channel,
                Overwrite::new(Target::Member(ticket.owner_id), Access::ReadOnly),
            )
            .await;
        self.effect("revoke_owner", channel, result);

        let transcript_delivered = self.archive(&ticket, &panel, channel).await;
        self.swap_controls(channel, origin, views::closed(actor.user_id))
            .await;

        Ok(ClosedTicket {
            ticket,
            transcript_delivered,
        })
    }

    /// Render, stage and deliver the transcript to the panel's archive
    /// channel. The staged file is removed whatever the outcome.
    async fn archive(&self, ticket: &Ticket, panel: &Panel, channel: ChannelId) -> bool {
        let staged = match self.render_transcript(channel).await {
            Ok(staged) => staged,
            Err(e) => {
                warn!(ticket = ticket.id, error = %e, "Failed to render transcript");
                metrics::record_side_effect_failure("transcript");
                return false;
            }
        };

        let message = OutgoingMessage::text(views::transcript_notice(ticket))
            .with_attachment(staged.attachment().clone());
        let result = self
            .platform
            .send_message(panel.transcript_channel_id, message)
            .await
            .map(|_| ());
        drop(staged);

        let delivered = self.effect("transcript", panel.transcript_channel_id, result);
        if delivered {
            debug!(ticket = ticket.id, "Transcript archived");
        }
        delivered
    }

    async fn render_transcript(&self, channel: ChannelId) -> TicketResult<StagedTranscript> {
        let name = self.platform.channel_name(channel).await?;
        let history = self.platform.channel_history(channel).await?;
        let html = transcript::render(&name, &history);
        self.transcripts
            .stage(&name, &html)
            .await
            .map_err(|e| TicketError::Provisioning(PlatformError::Io(e)))
    }

    /// Reopen a closed ticket. Staff only.
    pub async fn reopen_ticket(
        &self,
        channel: ChannelId,
        actor: &Actor,
        origin: Option<MessageId>,
    ) -> TicketResult<Ticket> {
        observe("reopen", async {
            let (mut ticket, panel) = self.load(channel).await?;
            actor.require_staff(&panel)?;
            if ticket.is_open() {
                return Err(TicketError::Conflict(Conflict::NotClosed));
            }

            self.db
                .tickets()
                .set_status(ticket.id, TicketStatus::Open)
                .await
                .map_err(|e| match e {
                    DbError::StatusUnchanged(_) => TicketError::Conflict(Conflict::NotClosed),
                    DbError::OpenTicketExists(_) => {
                        TicketError::Conflict(Conflict::OwnerHasOpenTicket)
                    }
                    other => other.into(),
                })?;
            ticket.status = TicketStatus::Open;
            info!(ticket = ticket.id, by = %actor.user_id, "Ticket reopened");

            let result = self
                .platform
                .rename_channel(channel, &channel_name(TicketStatus::Open, &ticket))
                .await;
            self.effect("rename", channel, result);

            let result = self
                .platform
                .set_overwrite(
                    channel,
                    Overwrite::new(Target::Member(ticket.owner_id), Access::ReadWrite),
                )
                .await;
            self.effect("restore_owner", channel, result);

            self.swap_controls(channel, origin, views::reopened(&panel, actor.user_id))
                .await;
            Ok(ticket)
        })
        .await
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Delete a ticket and its channel. Staff only.
    ///
    /// The row goes first, so a concurrent delete finds nothing to do. The
    /// channel is destroyed after a notice and the configured delay.
    pub async fn delete_ticket(&self, channel: ChannelId, actor: &Actor) -> TicketResult<Ticket> {
        observe("delete", async {
            let (ticket, panel) = self.load(channel).await?;
            actor.require_staff(&panel)?;

            if !self.db.tickets().delete(ticket.id).await? {
                return Err(TicketError::NotFound(Missing::Ticket));
            }
            info!(ticket = ticket.id, by = %actor.user_id, "Ticket deleted");

            let delay = self.config.delete_delay();
            if !delay.is_zero() {
                let result = self
                    .platform
                    .send_message(channel, views::delete_notice(delay.as_secs()))
                    .await
                    .map(|_| ());
                self.effect("delete_notice", channel, result);
                tokio::time::sleep(delay).await;
            }

            self.platform.delete_channel(channel).await.map_err(|e| {
                error!(ticket = ticket.id, channel = %channel, error = %e, "Ticket row removed but channel remains");
                TicketError::from(e)
            })?;
            Ok(ticket)
        })
        .await
    }

    // ========================================================================
    // Claims
    // ========================================================================

    /// Claim an open ticket on a claimable panel. Staff only.
    pub async fn claim(&self, channel: ChannelId, actor: &Actor) -> TicketResult<ClaimOutcome> {
        observe("claim", async {
            let (ticket, _) = self.claimable(channel, actor).await?;
            self.claim_loaded(ticket, actor).await
        })
        .await
    }

    /// Release a claim. Only its holder may release it.
    pub async fn unclaim(&self, channel: ChannelId, actor: &Actor) -> TicketResult<ClaimOutcome> {
        observe("unclaim", async {
            let (ticket, _) = self.claimable(channel, actor).await?;
            self.unclaim_loaded(ticket, actor).await
        })
        .await
    }

    /// Release the actor's own claim, otherwise claim.
    pub async fn toggle_claim(&self, channel: ChannelId, actor: &Actor) -> TicketResult<ClaimOutcome> {
        observe("claim", async {
            let (ticket, _) = self.claimable(channel, actor).await?;
            if ticket.claimed_by == Some(actor.user_id) {
                self.unclaim_loaded(ticket, actor).await
            } else {
                self.claim_loaded(ticket, actor).await
            }
        })
        .await
    }

    async fn claimable(&self, channel: ChannelId, actor: &Actor) -> TicketResult<(Ticket, Panel)> {
        let (ticket, panel) = self.load(channel).await?;
        actor.require_staff(&panel)?;
        if !panel.claimable {
            return Err(TicketError::Conflict(Conflict::NotClaimable));
        }
        Ok((ticket, panel))
    }

    async fn claim_loaded(&self, mut ticket: Ticket, actor: &Actor) -> TicketResult<ClaimOutcome> {
        for _ in 0..CLAIM_ATTEMPTS {
            if !ticket.is_open() {
                return Err(TicketError::Conflict(Conflict::TicketClosed));
            }
            if let Some(holder) = ticket.claimed_by {
                return Ok(ClaimOutcome::HeldBy(holder));
            }
            if self
                .db
                .tickets()
                .set_claimed_by(ticket.id, Some(actor.user_id), None)
                .await?
            {
                info!(ticket = ticket.id, by = %actor.user_id, "Ticket claimed");
                return Ok(ClaimOutcome::Claimed);
            }
            ticket = self
                .db
                .tickets()
                .find_by_id(ticket.id)
                .await?
                .ok_or(TicketError::NotFound(Missing::Ticket))?;
        }
        Err(TicketError::Internal(format!(
            "claim on ticket {} did not settle",
            ticket.id
        )))
    }

    async fn unclaim_loaded(&self, ticket: Ticket, actor: &Actor) -> TicketResult<ClaimOutcome> {
        match ticket.claimed_by {
            None => return Err(TicketError::Conflict(Conflict::NotClaimed)),
            Some(holder) if holder != actor.user_id => {
                return Err(TicketError::PermissionDenied(Denied::NotClaimant));
            }
            Some(_) => {}
        }
        if self
            .db
            .tickets()
            .set_claimed_by(ticket.id, None, Some(actor.user_id))
            .await?
        {
            info!(ticket = ticket.id, by = %actor.user_id, "Ticket unclaimed");
            Ok(ClaimOutcome::Unclaimed)
        } else {
            // Closed or released in the meantime.
            Err(TicketError::Conflict(Conflict::NotClaimed))
        }
    }

    // ========================================================================
    // Ticket management
    // ========================================================================

    /// Rename the ticket channel. Staff only.
    pub async fn rename_ticket(
        &self,
        channel: ChannelId,
        actor: &Actor,
        name: &str,
    ) -> TicketResult<String> {
        observe("rename", async {
            let (ticket, panel) = self.load(channel).await?;
            actor.require_staff(&panel)?;
            let name = validate_name(name)?;
            self.platform.rename_channel(channel, &name).await?;
            info!(ticket = ticket.id, name = %name, "Ticket renamed");
            Ok(name)
        })
        .await
    }

    /// Grant a member or role access to the ticket. Staff only.
    pub async fn add_participant(
        &self,
        channel: ChannelId,
        actor: &Actor,
        target: Target,
    ) -> TicketResult<()> {
        observe("add", async {
            let (ticket, panel) = self.load(channel).await?;
            actor.require_staff(&panel)?;
            self.platform
                .set_overwrite(channel, Overwrite::new(target, Access::ReadWrite))
                .await?;
            info!(ticket = ticket.id, target = %target.mention(), "Participant added");
            Ok(())
        })
        .await
    }

    /// Revoke a member's or role's explicit access. Staff only.
    pub async fn remove_participant(
        &self,
        channel: ChannelId,
        actor: &Actor,
        target: Target,
    ) -> TicketResult<()> {
        observe("remove", async {
            let (ticket, panel) = self.load(channel).await?;
            actor.require_staff(&panel)?;
            self.platform.clear_overwrite(channel, target).await?;
            info!(ticket = ticket.id, target = %target.mention(), "Participant removed");
            Ok(())
        })
        .await
    }

    /// Ask the owner to confirm the ticket can be closed. Staff only.
    pub async fn request_close(&self, channel: ChannelId, actor: &Actor) -> TicketResult<MessageId> {
        observe("close_request", async {
            let (ticket, panel) = self.load(channel).await?;
            actor.require_staff(&panel)?;
            if !ticket.is_open() {
                return Err(TicketError::Conflict(Conflict::AlreadyClosed));
            }
            let message = self
                .platform
                .send_message(channel, views::close_request(ticket.owner_id))
                .await?;
            Ok(message)
        })
        .await
    }

    /// Render a transcript on demand. Staff only.
    pub async fn transcript(&self, channel: ChannelId, actor: &Actor) -> TicketResult<StagedTranscript> {
        observe("transcript", async {
            let (_, panel) = self.load(channel).await?;
            actor.require_staff(&panel)?;
            self.render_transcript(channel).await
        })
        .await
    }

    // ========================================================================
    // Startup
    // ========================================================================

    /// Remove ticket rows left without a channel by an interrupted create.
    pub async fn recover_on_startup(&self) -> TicketResult<u64> {
        let max_age = i64::try_from(self.config.stale_provision_secs).unwrap_or(i64::MAX);
        let purged = self.db.tickets().purge_unprovisioned(max_age).await?;
        if purged > 0 {
            warn!(purged, "Purged tickets whose channel was never provisioned");
        }
        Ok(purged)
    }
}
