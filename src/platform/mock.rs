//! In-memory platform for tests.
//!
//! Records every channel, overwrite and message the engine produces, and can
//! be told to fail channel creation or message sends.

use super::{
    Access, ChannelId, ChannelSpec, GuildId, HistoryEntry, MessageId, OutgoingMessage, Overwrite,
    Platform, PlatformError, RoleId, Target, UserId,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

pub const BOT: UserId = UserId(1);

#[derive(Debug, Clone)]
pub struct MockMessage {
    pub id: MessageId,
    pub message: OutgoingMessage,
    /// Whether the attachment file existed when the message was sent.
    pub attachment_present: bool,
}

#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    pub guild: Option<GuildId>,
    pub name: String,
    pub parent: Option<ChannelId>,
    pub overwrites: HashMap<Target, Access>,
    pub messages: Vec<MockMessage>,
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    roles: HashSet<(GuildId, RoleId)>,
    categories: HashSet<(GuildId, ChannelId)>,
    channels: HashMap<ChannelId, MockChannel>,
    deleted: Vec<ChannelId>,
    fail_create: bool,
    fail_send: bool,
}

#[derive(Debug, Default)]
pub struct MockPlatform {
    state: Mutex<State>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1000,
                ..State::default()
            }),
        }
    }

    pub fn add_role(&self, guild: GuildId, role: RoleId) {
        self.state.lock().roles.insert((guild, role));
    }

    pub fn add_category(&self, guild: GuildId, category: ChannelId) {
        self.state.lock().categories.insert((guild, category));
    }

    pub fn add_text_channel(&self, guild: GuildId, channel: ChannelId, name: &str) {
        self.state.lock().channels.insert(
            channel,
            MockChannel {
                guild: Some(guild),
                name: name.to_string(),
                ..MockChannel::default()
            },
        );
    }

    pub fn remove_role(&self, guild: GuildId, role: RoleId) {
        self.state.lock().roles.remove(&(guild, role));
    }

    pub fn fail_channel_creation(&self, fail: bool) {
        self.state.lock().fail_create = fail;
    }

    pub fn fail_sends(&self, fail: bool) {
        self.state.lock().fail_send = fail;
    }

    pub fn channel(&self, id: ChannelId) -> Option<MockChannel> {
        self.state.lock().channels.get(&id).cloned()
    }

    /// Channels created under `parent`.
    pub fn channels_under(&self, parent: ChannelId) -> Vec<ChannelId> {
        let mut ids: Vec<_> = self
            .state
            .lock()
            .channels
            .iter()
            .filter(|(_, c)| c.parent == Some(parent))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    pub fn deleted(&self) -> Vec<ChannelId> {
        self.state.lock().deleted.clone()
    }

    pub fn messages(&self, channel: ChannelId) -> Vec<MockMessage> {
        self.channel(channel).map(|c| c.messages).unwrap_or_default()
    }

    /// Simulate a member posting in a channel.
    pub fn post(&self, channel: ChannelId, text: &str) {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = MessageId(state.next_id);
        if let Some(c) = state.channels.get_mut(&channel) {
            c.messages.push(MockMessage {
                id,
                message: OutgoingMessage::text(text),
                attachment_present: false,
            });
        }
    }

    fn with_channel<T>(
        &self,
        id: ChannelId,
        f: impl FnOnce(&mut MockChannel) -> T,
    ) -> Result<T, PlatformError> {
        self.state
            .lock()
            .channels
            .get_mut(&id)
            .map(f)
            .ok_or_else(|| PlatformError::NotFound(format!("channel {id}")))
    }
}

#[async_trait]
impl Platform for MockPlatform {
    fn bot_user(&self) -> UserId {
        BOT
    }

    async fn create_channel(
        &self,
        guild: GuildId,
        spec: ChannelSpec,
    ) -> Result<ChannelId, PlatformError> {
        // Let concurrent operations interleave around the remote call.
        tokio::task::yield_now().await;

        let mut state = self.state.lock();
        if state.fail_create {
            return Err(PlatformError::Forbidden("manage channels".into()));
        }
        state.next_id += 1;
        let id = ChannelId(state.next_id);
        state.channels.insert(
            id,
            MockChannel {
                guild: Some(guild),
                name: spec.name,
                parent: Some(spec.parent),
                overwrites: spec
                    .overwrites
                    .into_iter()
                    .map(|o: Overwrite| (o.target, o.access))
                    .collect(),
                messages: Vec::new(),
            },
        );
        Ok(id)
    }

    async fn rename_channel(&self, channel: ChannelId, name: &str) -> Result<(), PlatformError> {
        self.with_channel(channel, |c| c.name = name.to_string())
    }

    async fn set_overwrite(
        &self,
        channel: ChannelId,
        overwrite: Overwrite,
    ) -> Result<(), PlatformError> {
        self.with_channel(channel, |c| {
            c.overwrites.insert(overwrite.target, overwrite.access);
        })
    }

    async fn clear_overwrite(
        &self,
        channel: ChannelId,
        target: Target,
    ) -> Result<(), PlatformError> {
        self.with_channel(channel, |c| {
            c.overwrites.remove(&target);
        })
    }

    async fn delete_channel(&self, channel: ChannelId) -> Result<(), PlatformError> {
        let mut state = self.state.lock();
        if state.channels.remove(&channel).is_none() {
            return Err(PlatformError::NotFound(format!("channel {channel}")));
        }
        state.deleted.push(channel);
        Ok(())
    }

    async fn send_message(
        &self,
        channel: ChannelId,
        message: OutgoingMessage,
    ) -> Result<MessageId, PlatformError> {
        tokio::task::yield_now().await;

        let mut state = self.state.lock();
        if state.fail_send {
            return Err(PlatformError::Forbidden("send messages".into()));
        }
        state.next_id += 1;
        let id = MessageId(state.next_id);
        let attachment_present = message
            .attachment
            .as_ref()
            .is_some_and(|a| a.path.exists());
        let target = state
            .channels
            .get_mut(&channel)
            .ok_or_else(|| PlatformError::NotFound(format!("channel {channel}")))?;
        target.messages.push(MockMessage {
            id,
            message,
            attachment_present,
        });
        Ok(id)
    }

    async fn edit_message(
        &self,
        channel: ChannelId,
        message: MessageId,
        replacement: OutgoingMessage,
    ) -> Result<(), PlatformError> {
        self.with_channel(channel, |c| {
            c.messages
                .iter_mut()
                .find(|m| m.id == message)
                .map(|m| m.message = replacement)
        })?
        .ok_or_else(|| PlatformError::NotFound(format!("message {message}")))
    }

    async fn delete_message(
        &self,
        channel: ChannelId,
        message: MessageId,
    ) -> Result<(), PlatformError> {
        self.with_channel(channel, |c| c.messages.retain(|m| m.id != message))
    }

    async fn role_exists(&self, guild: GuildId, role: RoleId) -> Result<bool, PlatformError> {
        Ok(self.state.lock().roles.contains(&(guild, role)))
    }

    async fn category_exists(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<bool, PlatformError> {
        Ok(self.state.lock().categories.contains(&(guild, channel)))
    }

    async fn text_channel_exists(
        &self,
        guild: GuildId,
        channel: ChannelId,
    ) -> Result<bool, PlatformError> {
        Ok(self
            .state
            .lock()
            .channels
            .get(&channel)
            .is_some_and(|c| c.guild == Some(guild)))
    }

    async fn channel_name(&self, channel: ChannelId) -> Result<String, PlatformError> {
        self.with_channel(channel, |c| c.name.clone())
    }

    async fn channel_history(&self, channel: ChannelId) -> Result<Vec<HistoryEntry>, PlatformError> {
        self.with_channel(channel, |c| {
            c.messages
                .iter()
                .map(|m| HistoryEntry {
                    author_name: "member".to_string(),
                    author_avatar: None,
                    sent_at: chrono::Utc::now(),
                    content: m.message.content.clone().unwrap_or_default(),
                    attachments: Vec::new(),
                    embeds: m
                        .message
                        .embed
                        .iter()
                        .map(|e| (e.title.clone(), e.description.clone()))
                        .collect(),
                })
                .collect()
        })
    }
}
