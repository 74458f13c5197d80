//! Chat platform collaborator.
//!
//! The ticket engine never talks to Discord directly. Everything it needs from
//! the platform (channels, permission overwrites, messages, role lookups) goes
//! through the [`Platform`] trait so the lifecycle logic can be exercised
//! against an in-memory implementation.

pub mod discord;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

macro_rules! snowflake {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);

            impl $name {
                #[inline]
                pub fn get(self) -> u64 {
                    self.0
                }

                /// Storage form. Platform ids fit in 63 bits.
                #[inline]
                pub fn to_db(self) -> i64 {
                    self.0 as i64
                }

                #[inline]
                pub fn from_db(raw: i64) -> Self {
                    Self(raw as u64)
                }
            }

            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    write!(f, "{}", self.0)
                }
            }
        )*
    };
}

snowflake!(
    /// A guild (server).
    GuildId,
    /// A text channel or category.
    ChannelId,
    /// A message within a channel.
    MessageId,
    /// A user account.
    UserId,
    /// A guild role.
    RoleId,
);

impl UserId {
    pub fn mention(self) -> String {
        format!("<@{}>", self.0)
    }
}

impl RoleId {
    pub fn mention(self) -> String {
        format!("<@&{}>", self.0)
    }
}

impl ChannelId {
    pub fn mention(self) -> String {
        format!("<#{}>", self.0)
    }
}

/// Platform collaborator failures.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("missing permissions: {0}")]
    Forbidden(String),
    #[error("unknown {0}")]
    NotFound(String),
    #[error("platform request failed: {0}")]
    Request(String),
    #[error("attachment unreadable: {0}")]
    Io(#[from] std::io::Error),
}

/// Who a permission overwrite applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Target {
    /// The guild's @everyone role.
    Everyone,
    Member(UserId),
    Role(RoleId),
}

impl Target {
    pub fn mention(self) -> String {
        match self {
            Target::Everyone => "@everyone".to_string(),
            Target::Member(user) => user.mention(),
            Target::Role(role) => role.mention(),
        }
    }
}

/// Channel access granted by an overwrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// Cannot see the channel.
    Hidden,
    /// Can see the channel; sending follows the guild's role permissions.
    View,
    /// Can read history but not send.
    ReadOnly,
    /// Can read and send.
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Overwrite {
    pub target: Target,
    pub access: Access,
}

impl Overwrite {
    pub fn new(target: Target, access: Access) -> Self {
        Self { target, access }
    }
}

/// Request to create a channel under a category.
#[derive(Debug, Clone)]
pub struct ChannelSpec {
    pub name: String,
    pub parent: ChannelId,
    pub overwrites: Vec<Overwrite>,
}

/// Colors used by embeds, as 0xRRGGBB.
pub mod colors {
    pub const GREEN: u32 = 0x2ECC71;
    pub const DARK_GREEN: u32 = 0x1F8B4C;
    pub const RED: u32 = 0xE74C3C;
    pub const GOLD: u32 = 0xF1C40F;
    pub const GREY: u32 = 0x979C9F;
    pub const BLURPLE: u32 = 0x5865F2;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

/// Rich content block attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    pub title: Option<String>,
    pub description: Option<String>,
    pub color: u32,
    pub fields: Vec<EmbedField>,
}

impl Embed {
    pub fn new(color: u32) -> Self {
        Self {
            color,
            ..Self::default()
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

/// One interactive button bound to a fixed identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub custom_id: &'static str,
    pub label: String,
    pub style: ButtonStyle,
    pub emoji: Option<char>,
}

/// A file on disk to upload with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub path: PathBuf,
}

/// Message content to send or to replace an existing message with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub content: Option<String>,
    pub embed: Option<Embed>,
    pub buttons: Vec<Button>,
    pub attachment: Option<Attachment>,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn embed(embed: Embed) -> Self {
        Self {
            embed: Some(embed),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_buttons(mut self, buttons: Vec<Button>) -> Self {
        self.buttons = buttons;
        self
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }
}

/// A message from a channel's history, as needed for transcripts.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub author_name: String,
    pub author_avatar: Option<String>,
    pub sent_at: DateTime<Utc>,
    pub content: String,
    /// Attachment URLs.
    pub attachments: Vec<String>,
    /// Embedded structured content (title, description).
    pub embeds: Vec<(Option<String>, Option<String>)>,
}

/// Operations the ticket core consumes from the chat platform.
#[async_trait]
pub trait Platform: Send + Sync {
    /// The bot's own user id (granted access to every ticket channel).
    fn bot_user(&self) -> UserId;

    async fn create_channel(
        &self,
        guild: GuildId,
        spec: ChannelSpec,
    ) -> Result<ChannelId, PlatformError>;

    async fn rename_channel(&self, channel: ChannelId, name: &str) -> Result<(), PlatformError>;

    async fn set_overwrite(
        &self,
        channel: ChannelId,
        overwrite: Overwrite,
    ) -> Result<(), PlatformError>;

    async fn clear_overwrite(&self, channel: ChannelId, target: Target)
    -> Result<(), PlatformError>;

    async fn delete_channel(&self, channel: ChannelId) -> Result<(), PlatformError>;

    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutgoingMessage,
    ) -> Result<MessageId, PlatformError>;

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        replacement: OutgoingMessage,
    ) -> Result<(), PlatformError>;

    async fn delete_message(&self, channel: ChannelId, message: MessageId)
    -> Result<(), PlatformError>;

    async fn role_exists(&self, guild: GuildId, role: RoleId) -> Result<bool, PlatformError>;

    /// Whether `channel` is a category in `guild`.
    async fn category_exists(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<bool, PlatformError>;

    /// Whether `channel` is a text channel in `guild`.
    async fn text_channel_exists(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<bool, PlatformError>;

    async fn channel_name(&self, channel: ChannelId) -> Result<String, PlatformError>;

    /// Full history, oldest first.
    async fn channel_history(&self, channel: ChannelId) -> Result<Vec<HistoryEntry>, PlatformError>;
}
