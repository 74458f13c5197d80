//! Discord implementation of [`Platform`] over serenity's HTTP client.

use super::{
    Access, Attachment, Button, ButtonStyle, ChannelId, ChannelSpec, Embed, GuildId,
    HistoryEntry, MessageId, OutgoingMessage, Overwrite, Platform, PlatformError, RoleId, Target,
    UserId,
};
use async_trait::async_trait;
use chrono::DateTime;
use serenity::all::{
    ButtonStyle as DiscordButtonStyle, ChannelType, CreateActionRow, CreateAttachment,
    CreateButton, CreateChannel, CreateEmbed, CreateMessage, EditChannel, EditMessage,
    GetMessages, Http, HttpError, Message, PermissionOverwrite, PermissionOverwriteType,
    Permissions,
};
use serenity::model::id as discord;
use std::sync::Arc;
use tracing::debug;

/// Page size of the message history endpoint.
const HISTORY_PAGE: u8 = 100;

fn guild_id(id: GuildId) -> discord::GuildId {
    discord::GuildId::new(id.get())
}

fn channel_id(id: ChannelId) -> discord::ChannelId {
    discord::ChannelId::new(id.get())
}

fn message_id(id: MessageId) -> discord::MessageId {
    discord::MessageId::new(id.get())
}

fn classify(context: &str, err: serenity::Error) -> PlatformError {
    if let serenity::Error::Http(HttpError::UnsuccessfulRequest(response)) = &err {
        match response.status_code.as_u16() {
            403 => {
                return PlatformError::Forbidden(format!("{context}: {}", response.error.message));
            }
            404 => return PlatformError::NotFound(context.to_string()),
            _ => {}
        }
    }
    PlatformError::Request(format!("{context}: {err}"))
}

/// (allow, deny) for an access level.
fn permissions(access: Access) -> (Permissions, Permissions) {
    let view = Permissions::VIEW_CHANNEL | Permissions::READ_MESSAGE_HISTORY;
    match access {
        Access::Hidden => (Permissions::empty(), Permissions::VIEW_CHANNEL),
        Access::View => (view, Permissions::empty()),
        Access::ReadOnly => (view, Permissions::SEND_MESSAGES),
        Access::ReadWrite => (
            view | Permissions::SEND_MESSAGES | Permissions::ATTACH_FILES | Permissions::EMBED_LINKS,
            Permissions::empty(),
        ),
    }
}

/// `@everyone` is the role whose id equals the guild id.
fn overwrite_kind(guild: GuildId, target: Target) -> PermissionOverwriteType {
    match target {
        Target::Everyone => PermissionOverwriteType::Role(discord::RoleId::new(guild.get())),
        Target::Member(user) => PermissionOverwriteType::Member(discord::UserId::new(user.get())),
        Target::Role(role) => PermissionOverwriteType::Role(discord::RoleId::new(role.get())),
    }
}

fn permission_overwrite(guild: GuildId, overwrite: Overwrite) -> PermissionOverwrite {
    let (allow, deny) = permissions(overwrite.access);
    PermissionOverwrite {
        allow,
        deny,
        kind: overwrite_kind(guild, overwrite.target),
    }
}

pub(crate) fn create_embed(embed: &Embed) -> CreateEmbed {
    let mut builder = CreateEmbed::new().colour(embed.color);
    if let Some(title) = &embed.title {
        builder = builder.title(title);
    }
    if let Some(description) = &embed.description {
        builder = builder.description(description);
    }
    for field in &embed.fields {
        builder = builder.field(&field.name, &field.value, field.inline);
    }
    builder
}

fn create_button(button: &Button) -> CreateButton {
    let style = match button.style {
        ButtonStyle::Primary => DiscordButtonStyle::Primary,
        ButtonStyle::Secondary => DiscordButtonStyle::Secondary,
        ButtonStyle::Success => DiscordButtonStyle::Success,
        ButtonStyle::Danger => DiscordButtonStyle::Danger,
    };
    let mut builder = CreateButton::new(button.custom_id)
        .label(&button.label)
        .style(style);
    if let Some(emoji) = button.emoji {
        builder = builder.emoji(emoji);
    }
    builder
}

fn action_rows(buttons: &[Button]) -> Vec<CreateActionRow> {
    if buttons.is_empty() {
        return Vec::new();
    }
    vec![CreateActionRow::Buttons(
        buttons.iter().map(create_button).collect(),
    )]
}

pub(crate) async fn create_attachment(attachment: &Attachment) -> Result<CreateAttachment, PlatformError> {
    let bytes = tokio::fs::read(&attachment.path).await?;
    Ok(CreateAttachment::bytes(bytes, attachment.filename.clone()))
}

fn history_entry(message: Message) -> HistoryEntry {
    HistoryEntry {
        author_avatar: message.author.avatar_url(),
        author_name: message.author.name,
        sent_at: DateTime::from_timestamp(message.timestamp.unix_timestamp(), 0).unwrap_or_default(),
        content: message.content,
        attachments: message.attachments.into_iter().map(|a| a.url).collect(),
        embeds: message
            .embeds
            .into_iter()
            .map(|e| (e.title, e.description))
            .collect(),
    }
}

/// Talks to Discord's REST API.
pub struct DiscordPlatform {
    http: Arc<Http>,
    bot_user: UserId,
}

impl DiscordPlatform {
    /// Create the client and look up the bot's own user.
    pub async fn connect(token: &str) -> Result<Self, PlatformError> {
        let http = Arc::new(Http::new(token));
        let me = http
            .get_current_user()
            .await
            .map_err(|e| classify("current user", e))?;
        debug!(user = %me.name, id = %me.id, "Resolved bot user");
        Ok(Self {
            http,
            bot_user: UserId(me.id.get()),
        })
    }

    async fn guild_of(&self, channel: ChannelId) -> Result<GuildId, PlatformError> {
        channel_id(channel)
            .to_channel(&self.http)
            .await
            .map_err(|e| classify("channel", e))?
            .guild()
            .map(|c| GuildId(c.guild_id.get()))
            .ok_or_else(|| PlatformError::NotFound(format!("guild channel {channel}")))
    }

    async fn channel_kind(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<Option<ChannelType>, PlatformError> {
        let channels = guild_id(guild)
            .channels(&self.http)
            .await
            .map_err(|e| classify("guild channels", e))?;
        Ok(channels.get(&channel_id(channel)).map(|c| c.kind))
    }
}

#[async_trait]
impl Platform for DiscordPlatform {
    fn bot_user(&self) -> UserId {
        self.bot_user
    }

    async fn create_channel(
        &self,
        guild: GuildId,
        spec: ChannelSpec,
    ) -> Result<ChannelId, PlatformError> {
        let overwrites: Vec<_> = spec
            .overwrites
            .iter()
            .map(|o| permission_overwrite(guild, *o))
            .collect();
        let builder = CreateChannel::new(spec.name)
            .kind(ChannelType::Text)
            .category(channel_id(spec.parent))
            .permissions(overwrites);
        let created = guild_id(guild)
            .create_channel(&self.http, builder)
            .await
            .map_err(|e| classify("create channel", e))?;
        Ok(ChannelId(created.id.get()))
    }

    async fn rename_channel(&self, channel: ChannelId, name: &str) -> Result<(), PlatformError> {
        channel_id(channel)
            .edit(&self.http, EditChannel::new().name(name))
            .await
            .map_err(|e| classify("rename channel", e))?;
        Ok(())
    }

    async fn set_overwrite(
        &self,
        channel: ChannelId,
        overwrite: Overwrite,
    ) -> Result<(), PlatformError> {
        let guild = match overwrite.target {
            Target::Everyone => self.guild_of(channel).await?,
            // Only @everyone derives its id from the guild.
            _ => GuildId(0),
        };
        channel_id(channel)
            .create_permission(&self.http, permission_overwrite(guild, overwrite))
            .await
            .map_err(|e| classify("set permissions", e))
    }

    async fn clear_overwrite(
        &self,
        channel: ChannelId,
        target: Target,
    ) -> Result<(), PlatformError> {
        let guild = match target {
            Target::Everyone => self.guild_of(channel).await?,
            _ => GuildId(0),
        };
        channel_id(channel)
            .delete_permission(&self.http, overwrite_kind(guild, target))
            .await
            .map_err(|e| classify("clear permissions", e))
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<(), PlatformError> {
        channel_id(channel)
            .delete(&self.http)
            .await
            .map_err(|e| classify("delete channel", e))?;
        Ok(())
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutgoingMessage,
    ) -> Result<MessageId, PlatformError> {
        let mut builder = CreateMessage::new().components(action_rows(&message.buttons));
        if let Some(content) = message.content {
            builder = builder.content(content);
        }
        if let Some(embed) = &message.embed {
            builder = builder.embed(create_embed(embed));
        }
        if let Some(attachment) = &message.attachment {
            builder = builder.add_file(create_attachment(attachment).await?);
        }
        let sent = channel_id(channel)
            .send_message(&self.http, builder)
            .await
            .map_err(|e| classify("send message", e))?;
        Ok(MessageId(sent.id.get()))
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        replacement: OutgoingMessage,
    ) -> Result<(), PlatformError> {
        let builder = EditMessage::new()
            .content(replacement.content.unwrap_or_default())
            .embeds(replacement.embed.iter().map(create_embed).collect())
            .components(action_rows(&replacement.buttons));
        channel_id(channel)
            .edit_message(&self.http, message_id(message), builder)
            .await
            .map_err(|e| classify("edit message", e))?;
        Ok(())
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), PlatformError> {
        channel_id(channel)
            .delete_message(&self.http, message_id(message))
            .await
            .map_err(|e| classify("delete message", e))
    }

    async fn role_exists(&self, guild: GuildId, role: RoleId) -> Result<bool, PlatformError> {
        let roles = guild_id(guild)
            .roles(&self.http)
            .await
            .map_err(|e| classify("guild roles", e))?;
        Ok(roles.contains_key(&discord::RoleId::new(role.get())))
    }

    async fn category_exists(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<bool, PlatformError> {
        Ok(self.channel_kind(guild, channel).await? == Some(ChannelType::Category))
    }

    async fn text_channel_exists(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<bool, PlatformError> {
        Ok(matches!(
            self.channel_kind(guild, channel).await?,
            Some(ChannelType::Text | ChannelType::News)
        ))
    }

    async fn channel_name(&self, channel: ChannelId) -> Result<String, PlatformError> {
        channel_id(channel)
            .to_channel(&self.http)
            .await
            .map_err(|e| classify("channel", e))?
            .guild()
            .map(|c| c.name)
            .ok_or_else(|| PlatformError::NotFound(format!("guild channel {channel}")))
    }

    async fn channel_history(&self, channel: ChannelId) -> Result<Vec<HistoryEntry>, PlatformError> {
        let mut messages: Vec<Message> = Vec::new();
        let mut before = None;
        loop {
            let mut request = GetMessages::new().limit(HISTORY_PAGE);
            if let Some(oldest) = before {
                request = request.before(oldest);
            }
            let page = channel_id(channel)
                .messages(&self.http, request)
                .await
                .map_err(|e| classify("channel history", e))?;
            let full = page.len() == usize::from(HISTORY_PAGE);
            before = page.last().map(|m| m.id);
            messages.extend(page);
            if !full {
                break;
            }
        }
        // Pages arrive newest first.
        messages.reverse();
        Ok(messages.into_iter().map(history_entry).collect())
    }
}
