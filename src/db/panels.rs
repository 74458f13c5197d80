//! Panel repository.
//!
//! Panels are live configuration: tickets reference them by id, so an edit is
//! visible to every ticket of the panel on its next lookup.

use super::{DbError, is_unique_violation};
use crate::platform::{ChannelId, GuildId, MessageId, RoleId};
use sqlx::SqlitePool;

const DEFAULT_DESCRIPTION: &str = "To create a ticket, use the button below.";
const DEFAULT_BUTTON_TEXT: &str = "Create Ticket";
const DEFAULT_WELCOME: &str = "Thanks for reaching out. A member of the support team will be with you shortly.";

/// A configured ticket-creation entry point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Panel {
    pub id: i64,
    pub guild_id: GuildId,
    pub name: String,
    /// Entry-point message, once posted.
    pub message_id: Option<MessageId>,
    pub channel_id: Option<ChannelId>,
    /// Never empty.
    pub support_roles: Vec<RoleId>,
    pub category_id: ChannelId,
    pub transcript_channel_id: ChannelId,
    pub claimable: bool,
    pub description: Option<String>,
    pub button_text: Option<String>,
    pub welcome_message: Option<String>,
}

impl Panel {
    pub fn description(&self) -> &str {
        self.description.as_deref().unwrap_or(DEFAULT_DESCRIPTION)
    }

    pub fn button_text(&self) -> &str {
        self.button_text.as_deref().unwrap_or(DEFAULT_BUTTON_TEXT)
    }

    pub fn welcome_message(&self) -> &str {
        self.welcome_message.as_deref().unwrap_or(DEFAULT_WELCOME)
    }

    pub fn has_support_role(&self, roles: &[RoleId]) -> bool {
        self.support_roles.iter().any(|r| roles.contains(r))
    }
}

/// Fields for a new panel.
#[derive(Debug, Clone)]
pub struct NewPanel {
    pub guild_id: GuildId,
    pub name: String,
    pub support_roles: Vec<RoleId>,
    pub category_id: ChannelId,
    pub transcript_channel_id: ChannelId,
    pub claimable: bool,
    pub description: Option<String>,
    pub button_text: Option<String>,
    pub welcome_message: Option<String>,
}

/// Partial update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct PanelUpdate {
    pub name: Option<String>,
    pub support_roles: Option<Vec<RoleId>>,
    pub category_id: Option<ChannelId>,
    pub transcript_channel_id: Option<ChannelId>,
    pub claimable: Option<bool>,
    pub description: Option<String>,
    pub button_text: Option<String>,
    pub welcome_message: Option<String>,
}

impl PanelUpdate {
    /// Whether the change alters what the entry-point message shows.
    pub fn touches_entry_point(&self) -> bool {
        self.name.is_some() || self.description.is_some() || self.button_text.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.support_roles.is_none()
            && self.category_id.is_none()
            && self.transcript_channel_id.is_none()
            && self.claimable.is_none()
            && self.description.is_none()
            && self.button_text.is_none()
            && self.welcome_message.is_none()
    }
}

type PanelRow = (
    i64,
    i64,
    String,
    Option<i64>,
    Option<i64>,
    i64,
    i64,
    bool,
    Option<String>,
    Option<String>,
    Option<String>,
);

const PANEL_COLUMNS: &str = "panel_id, guild_id, name, message_id, channel_id, category_id, \
     transcript_channel_id, claimable, description, button_text, welcome_message";

/// Repository for panel operations.
pub struct PanelRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> PanelRepository<'a> {
    /// Create a new panel repository.
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a panel and its support roles. The entry-point message is bound later.
    pub async fn create(&self, panel: &NewPanel) -> Result<Panel, DbError> {
        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO panels (guild_id, name, category_id, transcript_channel_id, claimable,
                                description, button_text, welcome_message, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(panel.guild_id.to_db())
        .bind(&panel.name)
        .bind(panel.category_id.to_db())
        .bind(panel.transcript_channel_id.to_db())
        .bind(panel.claimable)
        .bind(&panel.description)
        .bind(&panel.button_text)
        .bind(&panel.welcome_message)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        let panel_id = result.last_insert_rowid();

        for role in &panel.support_roles {
            sqlx::query("INSERT OR IGNORE INTO panel_support_roles (panel_id, role_id) VALUES (?, ?)")
                .bind(panel_id)
                .bind(role.to_db())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        Ok(Panel {
            id: panel_id,
            guild_id: panel.guild_id,
            name: panel.name.clone(),
            message_id: None,
            channel_id: None,
            support_roles: dedup_roles(&panel.support_roles),
            category_id: panel.category_id,
            transcript_channel_id: panel.transcript_channel_id,
            claimable: panel.claimable,
            description: panel.description.clone(),
            button_text: panel.button_text.clone(),
            welcome_message: panel.welcome_message.clone(),
        })
    }

    /// Find panel by id.
    pub async fn find_by_id(&self, panel_id: i64) -> Result<Option<Panel>, DbError> {
        let row = sqlx::query_as::<_, PanelRow>(&format!(
            "SELECT {PANEL_COLUMNS} FROM panels WHERE panel_id = ?"
        ))
        .bind(panel_id)
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// Resolve the panel whose entry-point message was clicked.
    pub async fn find_by_message(&self, message_id: MessageId) -> Result<Option<Panel>, DbError> {
        let row = sqlx::query_as::<_, PanelRow>(&format!(
            "SELECT {PANEL_COLUMNS} FROM panels WHERE message_id = ?"
        ))
        .bind(message_id.to_db())
        .fetch_optional(self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    /// All panels of a guild, oldest first.
    pub async fn list_for_guild(&self, guild_id: GuildId) -> Result<Vec<Panel>, DbError> {
        let rows = sqlx::query_as::<_, PanelRow>(&format!(
            "SELECT {PANEL_COLUMNS} FROM panels WHERE guild_id = ? ORDER BY panel_id"
        ))
        .bind(guild_id.to_db())
        .fetch_all(self.pool)
        .await?;

        let mut panels = Vec::with_capacity(rows.len());
        for row in rows {
            panels.push(self.hydrate(row).await?);
        }
        Ok(panels)
    }

    /// Bind (or rebind) the posted entry-point message.
    pub async fn set_message(
        &self,
        panel_id: i64,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE panels SET message_id = ?, channel_id = ? WHERE panel_id = ?")
            .bind(message_id.to_db())
            .bind(channel_id.to_db())
            .bind(panel_id)
            .execute(self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    DbError::MessageInUse(message_id.get())
                } else {
                    DbError::from(e)
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(DbError::PanelNotFound(panel_id));
        }
        Ok(())
    }

    /// Apply a partial update. Support roles are replaced as a set.
    pub async fn update(&self, panel_id: i64, update: &PanelUpdate) -> Result<Panel, DbError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE panels SET
                name = COALESCE(?, name),
                category_id = COALESCE(?, category_id),
                transcript_channel_id = COALESCE(?, transcript_channel_id),
                claimable = COALESCE(?, claimable),
                description = COALESCE(?, description),
                button_text = COALESCE(?, button_text),
                welcome_message = COALESCE(?, welcome_message)
            WHERE panel_id = ?
            "#,
        )
        .bind(&update.name)
        .bind(update.category_id.map(ChannelId::to_db))
        .bind(update.transcript_channel_id.map(ChannelId::to_db))
        .bind(update.claimable)
        .bind(&update.description)
        .bind(&update.button_text)
        .bind(&update.welcome_message)
        .bind(panel_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::PanelNotFound(panel_id));
        }

        // Claims only exist on claimable panels.
        if update.claimable == Some(false) {
            sqlx::query("UPDATE tickets SET claimed_by = NULL WHERE panel_id = ?")
                .bind(panel_id)
                .execute(&mut *tx)
                .await?;
        }

        if let Some(roles) = &update.support_roles {
            sqlx::query("DELETE FROM panel_support_roles WHERE panel_id = ?")
                .bind(panel_id)
                .execute(&mut *tx)
                .await?;
            for role in roles {
                sqlx::query(
                    "INSERT OR IGNORE INTO panel_support_roles (panel_id, role_id) VALUES (?, ?)",
                )
                .bind(panel_id)
                .bind(role.to_db())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        self.find_by_id(panel_id)
            .await?
            .ok_or(DbError::PanelNotFound(panel_id))
    }

    /// Remove a panel that never got its entry point posted.
    pub async fn discard_unposted(&self, panel_id: i64) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM panels WHERE panel_id = ? AND message_id IS NULL")
            .bind(panel_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn support_roles(&self, panel_id: i64) -> Result<Vec<RoleId>, DbError> {
        let rows = sqlx::query_scalar::<_, i64>(
            "SELECT role_id FROM panel_support_roles WHERE panel_id = ? ORDER BY rowid",
        )
        .bind(panel_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(RoleId::from_db).collect())
    }

    async fn hydrate(&self, row: PanelRow) -> Result<Panel, DbError> {
        let (
            id,
            guild_id,
            name,
            message_id,
            channel_id,
            category_id,
            transcript_channel_id,
            claimable,
            description,
            button_text,
            welcome_message,
        ) = row;

        let support_roles = self.support_roles(id).await?;
        if support_roles.is_empty() {
            return Err(DbError::Corrupt(format!("panel {id} has no support roles")));
        }

        Ok(Panel {
            id,
            guild_id: GuildId::from_db(guild_id),
            name,
            message_id: message_id.map(MessageId::from_db),
            channel_id: channel_id.map(ChannelId::from_db),
            support_roles,
            category_id: ChannelId::from_db(category_id),
            transcript_channel_id: ChannelId::from_db(transcript_channel_id),
            claimable,
            description,
            button_text,
            welcome_message,
        })
    }
}

fn dedup_roles(roles: &[RoleId]) -> Vec<RoleId> {
    let mut out: Vec<RoleId> = Vec::with_capacity(roles.len());
    for role in roles {
        if !out.contains(role) {
            out.push(*role);
        }
    }
    out
}
