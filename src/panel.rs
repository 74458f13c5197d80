//! Panel registry.
//!
//! Administrators create and edit panels; the ticket engine only reads them.
//! Every reference a panel holds (support roles, category, archive channel) is
//! checked against the platform before it is stored.

use crate::db::{Database, NewPanel, Panel, PanelUpdate};
use crate::error::{Conflict, Missing, TicketError, TicketResult};
use crate::platform::{ChannelId, GuildId, Platform, RoleId};
use crate::telemetry::observe;
use crate::ticket::Actor;
use crate::views;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Embed titles are capped by the platform.
const MAX_PANEL_NAME: usize = 256;

/// Everything needed to create a panel and post its entry point.
#[derive(Debug, Clone)]
pub struct PanelDraft {
    pub name: String,
    pub support_roles: Vec<RoleId>,
    pub category_id: ChannelId,
    pub transcript_channel_id: ChannelId,
    /// Where the entry-point message is posted.
    pub panel_channel_id: ChannelId,
    pub claimable: bool,
    pub description: Option<String>,
    pub button_text: Option<String>,
    pub welcome_message: Option<String>,
}

fn check_name(name: &str) -> TicketResult<()> {
    if name.trim().is_empty() {
        return Err(TicketError::Conflict(Conflict::InvalidName(
            "panel name cannot be empty".into(),
        )));
    }
    if name.chars().count() > MAX_PANEL_NAME {
        return Err(TicketError::Conflict(Conflict::InvalidName(format!(
            "panel name cannot exceed {MAX_PANEL_NAME} characters"
        ))));
    }
    Ok(())
}

pub struct PanelRegistry {
    db: Database,
    platform: Arc<dyn Platform>,
}

impl PanelRegistry {
    pub fn new(db: Database, platform: Arc<dyn Platform>) -> Self {
        Self { db, platform }
    }

    async fn check_roles(&self, guild: GuildId, roles: &[RoleId]) -> TicketResult<()> {
        if roles.is_empty() {
            return Err(TicketError::Conflict(Conflict::NoSupportRoles));
        }
        for role in roles {
            if !self.platform.role_exists(guild, *role).await? {
                return Err(TicketError::NotFound(Missing::Role(*role)));
            }
        }
        Ok(())
    }

    async fn check_category(&self, guild: GuildId, category: ChannelId) -> TicketResult<()> {
        if self.platform.category_exists(guild, category).await? {
            Ok(())
        } else {
            Err(TicketError::NotFound(Missing::Category(category)))
        }
    }

    async fn check_text_channel(&self, guild: GuildId, channel: ChannelId) -> TicketResult<()> {
        if self.platform.text_channel_exists(guild, channel).await? {
            Ok(())
        } else {
            Err(TicketError::NotFound(Missing::Channel(channel)))
        }
    }

    /// Create a panel and post its entry point. Administrators only.
    ///
    /// The row is discarded if the entry point cannot be posted, so a panel
    /// is never left without one.
    pub async fn create_panel(
        &self,
        guild: GuildId,
        actor: &Actor,
        draft: PanelDraft,
    ) -> TicketResult<Panel> {
        observe("panel_create", async {
            actor.require_admin()?;
            check_name(&draft.name)?;
            self.check_roles(guild, &draft.support_roles).await?;
            self.check_category(guild, draft.category_id).await?;
            self.check_text_channel(guild, draft.transcript_channel_id)
                .await?;
            self.check_text_channel(guild, draft.panel_channel_id).await?;

            let mut panel = self
                .db
                .panels()
                .create(&NewPanel {
                    guild_id: guild,
                    name: draft.name.trim().to_string(),
                    support_roles: draft.support_roles,
                    category_id: draft.category_id,
                    transcript_channel_id: draft.transcript_channel_id,
                    claimable: draft.claimable,
                    description: draft.description,
                    button_text: draft.button_text,
                    welcome_message: draft.welcome_message,
                })
                .await?;

            let channel = draft.panel_channel_id;
            let message = match self
                .platform
                .send_message(channel, views::entry_point(&panel))
                .await
            {
                Ok(message) => message,
                Err(e) => {
                    self.discard(panel.id).await;
                    return Err(e.into());
                }
            };

            if let Err(e) = self.db.panels().set_message(panel.id, channel, message).await {
                if let Err(pe) = self.platform.delete_message(channel, message).await {
                    warn!(panel = panel.id, error = %pe, "Failed to remove unbound entry point");
                }
                self.discard(panel.id).await;
                return Err(e.into());
            }
            panel.channel_id = Some(channel);
            panel.message_id = Some(message);

            info!(panel = panel.id, guild = %guild, name = %panel.name, "Panel created");
            Ok(panel)
        })
        .await
    }

    async fn discard(&self, panel_id: i64) {
        if let Err(e) = self.db.panels().discard_unposted(panel_id).await {
            error!(panel = panel_id, error = %e, "Failed to discard panel without entry point");
        }
    }

    /// Apply a partial update. Administrators only.
    ///
    /// When the change alters what the entry point shows, a fresh entry point
    /// is posted and bound before the old message is removed.
    pub async fn edit_panel(
        &self,
        guild: GuildId,
        actor: &Actor,
        panel_id: i64,
        update: PanelUpdate,
    ) -> TicketResult<Panel> {
        observe("panel_edit", async {
            actor.require_admin()?;
            if update.is_empty() {
                return Err(TicketError::Conflict(Conflict::NothingToUpdate));
            }
            self.db
                .panels()
                .find_by_id(panel_id)
                .await?
                .filter(|p| p.guild_id == guild)
                .ok_or(TicketError::NotFound(Missing::PanelId(panel_id)))?;

            if let Some(name) = &update.name {
                check_name(name)?;
            }
            if let Some(roles) = &update.support_roles {
                self.check_roles(guild, roles).await?;
            }
            if let Some(category) = update.category_id {
                self.check_category(guild, category).await?;
            }
            if let Some(channel) = update.transcript_channel_id {
                self.check_text_channel(guild, channel).await?;
            }

            let mut panel = self.db.panels().update(panel_id, &update).await?;

            if update.touches_entry_point()
                && let (Some(channel), Some(old)) = (panel.channel_id, panel.message_id)
            {
                let fresh = self
                    .platform
                    .send_message(channel, views::entry_point(&panel))
                    .await?;
                if let Err(e) = self.db.panels().set_message(panel.id, channel, fresh).await {
                    if let Err(pe) = self.platform.delete_message(channel, fresh).await {
                        warn!(panel = panel.id, error = %pe, "Failed to remove unbound entry point");
                    }
                    return Err(e.into());
                }
                panel.message_id = Some(fresh);

                if let Err(e) = self.platform.delete_message(channel, old).await {
                    warn!(panel = panel.id, error = %e, "Failed to remove previous entry point");
                }
            }

            info!(panel = panel.id, guild = %guild, "Panel updated");
            Ok(panel)
        })
        .await
    }

    /// Panels of a guild. Administrators only.
    pub async fn list_panels(&self, guild: GuildId, actor: &Actor) -> TicketResult<Vec<Panel>> {
        observe("panel_list", async {
            actor.require_admin()?;
            Ok(self.db.panels().list_for_guild(guild).await?)
        })
        .await
    }
}
