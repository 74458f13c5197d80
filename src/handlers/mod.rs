//! Interaction handlers.
//!
//! This module contains the handler traits and the registry that dispatches
//! persistent-control clicks and slash commands to the ticket engine and the
//! panel registry. Handlers are platform-neutral: the gateway converts
//! serenity interactions into an [`Invocation`] plus [`CommandArgs`], and
//! turns the returned [`Reply`] back into interaction responses.

mod controls;
mod misc;
mod panels;
mod tickets;

pub use controls::{
    ClaimTicketHandler, CloseTicketHandler, ConfirmCloseHandler, CreateTicketHandler,
    DeleteTicketHandler, ReopenTicketHandler,
};
pub use misc::HelpHandler;
pub use panels::{EditPanelHandler, PanelsHandler, SetupHandler};
pub use tickets::{
    AddHandler, ClaimHandler, CloseHandler, CloseRequestHandler, OpenHandler, RemoveHandler,
    RenameHandler, TranscriptHandler,
};

use crate::error::{TicketError, TicketResult};
use crate::metrics;
use crate::panel::PanelRegistry;
use crate::platform::{ChannelId, Embed, GuildId, MessageId, RoleId, Target, UserId};
use crate::telemetry::spans;
use crate::ticket::{Actor, StagedTranscript, TicketEngine};
use crate::views::{ControlId, ControlRegistry};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{Instrument, debug, error};

// ============================================================================
// Interaction input
// ============================================================================

/// Where an interaction happened and who triggered it.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    /// Message carrying the clicked control (component interactions only).
    pub message_id: Option<MessageId>,
    pub actor: Actor,
}

/// A resolved slash command option value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    User(UserId),
    Role(RoleId),
    Channel(ChannelId),
}

/// Slash command options by name.
#[derive(Debug, Clone, Default)]
pub struct CommandArgs {
    values: HashMap<String, OptionValue>,
}

impl CommandArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: OptionValue) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: OptionValue) {
        self.values.insert(name.into(), value);
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(OptionValue::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(OptionValue::Integer(i)) => Some(*i),
            _ => None,
        }
    }

    pub fn boolean(&self, name: &str) -> Option<bool> {
        match self.values.get(name) {
            Some(OptionValue::Boolean(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn role(&self, name: &str) -> Option<RoleId> {
        match self.values.get(name) {
            Some(OptionValue::Role(r)) => Some(*r),
            _ => None,
        }
    }

    pub fn channel(&self, name: &str) -> Option<ChannelId> {
        match self.values.get(name) {
            Some(OptionValue::Channel(c)) => Some(*c),
            _ => None,
        }
    }

    /// A user or role option as a permission target.
    pub fn target(&self, name: &str) -> Option<Target> {
        match self.values.get(name) {
            Some(OptionValue::User(u)) => Some(Target::Member(*u)),
            Some(OptionValue::Role(r)) => Some(Target::Role(*r)),
            _ => None,
        }
    }
}

/// Required options are enforced by the platform; a missing one is a fault.
pub(crate) fn required<T>(value: Option<T>, name: &str) -> TicketResult<T> {
    value.ok_or_else(|| TicketError::Internal(format!("missing required option `{name}`")))
}

// ============================================================================
// Command definitions
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionKind {
    String,
    Integer,
    Boolean,
    Role,
    /// A user or a role.
    Mentionable,
    TextChannel,
    Category,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOption {
    pub name: &'static str,
    pub description: &'static str,
    pub kind: OptionKind,
    pub required: bool,
}

impl CommandOption {
    pub const fn required(name: &'static str, description: &'static str, kind: OptionKind) -> Self {
        Self {
            name,
            description,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, description: &'static str, kind: OptionKind) -> Self {
        Self {
            name,
            description,
            kind,
            required: false,
        }
    }
}

/// A slash command as registered with the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlashCommand {
    pub name: &'static str,
    pub description: &'static str,
    pub options: Vec<CommandOption>,
    /// Hidden from members without administrator permission.
    pub admin_only: bool,
}

impl SlashCommand {
    pub fn new(name: &'static str, description: &'static str) -> Self {
        Self {
            name,
            description,
            options: Vec::new(),
            admin_only: false,
        }
    }

    pub fn option(mut self, option: CommandOption) -> Self {
        self.options.push(option);
        self
    }

    pub fn admin_only(mut self) -> Self {
        self.admin_only = true;
        self
    }
}

// ============================================================================
// Replies
// ============================================================================

/// What to answer an interaction with.
#[derive(Debug, Default)]
pub struct Reply {
    pub content: Option<String>,
    pub embed: Option<Embed>,
    /// Visible only to the invoker.
    pub ephemeral: bool,
    /// Uploaded with the reply; the staged file is removed when the reply is dropped.
    pub attachment: Option<StagedTranscript>,
}

impl Reply {
    /// Acknowledge without answering; the operation's own messages speak for it.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn private(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ephemeral: true,
            ..Self::default()
        }
    }

    pub fn public_embed(embed: Embed) -> Self {
        Self {
            embed: Some(embed),
            ..Self::default()
        }
    }

    pub fn private_embed(embed: Embed) -> Self {
        Self {
            embed: Some(embed),
            ephemeral: true,
            ..Self::default()
        }
    }

    pub fn with_attachment(mut self, staged: StagedTranscript) -> Self {
        self.attachment = Some(staged);
        self
    }

    pub fn is_silent(&self) -> bool {
        self.content.is_none() && self.embed.is_none() && self.attachment.is_none()
    }

    /// Private reply describing a failed operation.
    pub fn error(err: &TicketError) -> Self {
        Self::private(err.user_message())
    }
}

// ============================================================================
// Handler traits
// ============================================================================

/// Handler context passed to each handler.
pub struct Context<'a> {
    pub engine: &'a TicketEngine,
    pub panels: &'a PanelRegistry,
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub message_id: Option<MessageId>,
    pub actor: &'a Actor,
}

/// Handles clicks on one persistent control.
#[async_trait]
pub trait ControlHandler: Send + Sync {
    async fn handle(&self, ctx: &Context<'_>) -> TicketResult<Reply>;
}

/// Handles one slash command.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    fn definition(&self) -> SlashCommand;

    /// Whether successful replies are shown only to the invoker.
    fn private(&self) -> bool {
        true
    }

    async fn handle(&self, ctx: &Context<'_>, args: &CommandArgs) -> TicketResult<Reply>;
}

/// The handler for a persistent control.
fn control_handler(control: ControlId) -> &'static dyn ControlHandler {
    match control {
        ControlId::CreateTicket => &CreateTicketHandler,
        ControlId::CloseTicket => &CloseTicketHandler,
        ControlId::ClaimTicket => &ClaimTicketHandler,
        ControlId::ReopenTicket => &ReopenTicketHandler,
        ControlId::DeleteTicket => &DeleteTicketHandler,
        ControlId::ConfirmClose => &ConfirmCloseHandler,
    }
}

/// Registry of control and command handlers.
pub struct Registry {
    controls: ControlRegistry,
    commands: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl Registry {
    /// Create a registry with every handler registered.
    pub fn new() -> Self {
        let controls = ControlRegistry::register_all();

        let handlers: Vec<Box<dyn CommandHandler>> = vec![
            Box::new(HelpHandler),
            Box::new(SetupHandler),
            Box::new(EditPanelHandler),
            Box::new(PanelsHandler),
            Box::new(AddHandler),
            Box::new(RemoveHandler),
            Box::new(CloseHandler),
            Box::new(OpenHandler),
            Box::new(RenameHandler),
            Box::new(ClaimHandler),
            Box::new(CloseRequestHandler),
            Box::new(TranscriptHandler),
        ];
        let commands = handlers
            .into_iter()
            .map(|h| (h.definition().name, h))
            .collect();

        Self { controls, commands }
    }

    /// Definitions of every registered command, sorted by name.
    pub fn definitions(&self) -> Vec<SlashCommand> {
        let mut defs: Vec<_> = self.commands.values().map(|h| h.definition()).collect();
        defs.sort_by_key(|d| d.name);
        defs
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Dispatch
// ============================================================================

/// Routes interactions to handlers and maps their outcome to a [`Reply`].
pub struct Dispatcher {
    engine: Arc<TicketEngine>,
    panels: Arc<PanelRegistry>,
    registry: Registry,
}

impl Dispatcher {
    pub fn new(engine: Arc<TicketEngine>, panels: Arc<PanelRegistry>) -> Self {
        Self {
            engine,
            panels,
            registry: Registry::new(),
        }
    }

    pub fn commands(&self) -> Vec<SlashCommand> {
        self.registry.definitions()
    }

    /// Whether a command's successful reply is private. Unknown commands are.
    pub fn is_private(&self, command: &str) -> bool {
        self.registry
            .commands
            .get(command)
            .is_none_or(|h| h.private())
    }

    fn context<'a>(&'a self, invocation: &'a Invocation) -> Context<'a> {
        Context {
            engine: &self.engine,
            panels: &self.panels,
            guild_id: invocation.guild_id,
            channel_id: invocation.channel_id,
            message_id: invocation.message_id,
            actor: &invocation.actor,
        }
    }

    /// Dispatch a control click. `None` when the identifier is not ours.
    pub async fn dispatch_control(&self, invocation: &Invocation, custom_id: &str) -> Option<Reply> {
        let control = self.registry.controls.resolve(custom_id)?;
        let handler = control_handler(control);
        metrics::record_interaction("component");

        let span = spans::interaction(
            "component",
            control.label(),
            invocation.guild_id,
            invocation.channel_id,
            invocation.actor.user_id,
        );
        let ctx = self.context(invocation);
        let result = handler.handle(&ctx).instrument(span.clone()).await;
        Some(span.in_scope(|| finish(control.label(), result)))
    }

    /// Dispatch a slash command. `None` when the command is not ours.
    pub async fn dispatch_command(
        &self,
        invocation: &Invocation,
        name: &str,
        args: &CommandArgs,
    ) -> Option<Reply> {
        let handler = self.registry.commands.get(name)?;
        metrics::record_interaction("command");

        let span = spans::interaction(
            "command",
            name,
            invocation.guild_id,
            invocation.channel_id,
            invocation.actor.user_id,
        );
        let ctx = self.context(invocation);
        let result = handler.handle(&ctx, args).instrument(span.clone()).await;
        Some(span.in_scope(|| finish(name, result)))
    }
}

fn finish(name: &str, result: TicketResult<Reply>) -> Reply {
    match result {
        Ok(reply) => reply,
        Err(e) if e.is_fault() => {
            error!(name, error = %e, "Interaction failed");
            Reply::error(&e)
        }
        Err(e) => {
            debug!(name, code = e.error_code(), error = %e, "Interaction refused");
            Reply::error(&e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TicketsConfig;
    use crate::db::Database;
    use crate::platform::mock::MockPlatform;
    use crate::ticket::TranscriptStager;
    use tempfile::TempDir;

    pub(super) const GUILD: GuildId = GuildId(7);
    pub(super) const SUPPORT: RoleId = RoleId(70);
    pub(super) const CATEGORY: ChannelId = ChannelId(71);
    pub(super) const ARCHIVE: ChannelId = ChannelId(72);
    pub(super) const LOBBY: ChannelId = ChannelId(73);

    pub(super) struct Harness {
        pub dispatcher: Dispatcher,
        pub platform: Arc<MockPlatform>,
        _staging: TempDir,
    }

    pub(super) async fn harness() -> Harness {
        let db = Database::new(":memory:").await.unwrap();
        let platform = Arc::new(MockPlatform::new());
        platform.add_role(GUILD, SUPPORT);
        platform.add_category(GUILD, CATEGORY);
        platform.add_text_channel(GUILD, ARCHIVE, "transcripts");
        platform.add_text_channel(GUILD, LOBBY, "support");

        let staging = tempfile::tempdir().unwrap();
        let engine = TicketEngine::new(
            db.clone(),
            platform.clone(),
            TranscriptStager::new(staging.path().to_path_buf()),
            TicketsConfig {
                delete_delay_secs: 0,
                stale_provision_secs: 300,
            },
        );
        let panels = PanelRegistry::new(db, platform.clone());
        Harness {
            dispatcher: Dispatcher::new(Arc::new(engine), Arc::new(panels)),
            platform,
            _staging: staging,
        }
    }

    pub(super) fn invocation(channel: ChannelId, actor: Actor) -> Invocation {
        Invocation {
            guild_id: GUILD,
            channel_id: channel,
            message_id: None,
            actor,
        }
    }

    pub(super) fn admin() -> Actor {
        Actor::new(UserId(1_000), vec![], true)
    }

    pub(super) fn member(id: u64) -> Actor {
        Actor::new(UserId(id), vec![], false)
    }

    pub(super) fn staff(id: u64) -> Actor {
        Actor::new(UserId(id), vec![SUPPORT], false)
    }

    /// Run `/setup` in the lobby and return the entry-point message id.
    pub(super) async fn setup_panel(h: &Harness, claimable: bool) -> MessageId {
        let args = CommandArgs::new()
            .with("name", OptionValue::String("Support".into()))
            .with("support_role", OptionValue::Role(SUPPORT))
            .with("category", OptionValue::Channel(CATEGORY))
            .with("transcript_channel", OptionValue::Channel(ARCHIVE))
            .with("panel_channel", OptionValue::Channel(LOBBY))
            .with("claimable", OptionValue::Boolean(claimable));
        let reply = h
            .dispatcher
            .dispatch_command(&invocation(LOBBY, admin()), "setup", &args)
            .await
            .unwrap();
        assert!(reply.ephemeral);
        h.platform.messages(LOBBY).last().unwrap().id
    }

    /// Click the entry point and return the new ticket channel.
    pub(super) async fn open_ticket(h: &Harness, entry: MessageId, owner: u64) -> ChannelId {
        let mut inv = invocation(LOBBY, member(owner));
        inv.message_id = Some(entry);
        let reply = h
            .dispatcher
            .dispatch_control(&inv, ControlId::CreateTicket.custom_id())
            .await
            .unwrap();
        assert!(reply.ephemeral);
        *h.platform.channels_under(CATEGORY).last().unwrap()
    }

    #[tokio::test]
    async fn test_registry_covers_every_control_and_command() {
        let h = harness().await;
        for control in ControlId::ALL {
            let inv = invocation(LOBBY, member(5));
            assert!(
                h.dispatcher
                    .dispatch_control(&inv, control.custom_id())
                    .await
                    .is_some(),
                "{} has no handler",
                control.label()
            );
        }
        let registry = Registry::new();
        let names: Vec<_> = registry.definitions().iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "add",
                "claim",
                "close",
                "closerequest",
                "editpanel",
                "help",
                "open",
                "panels",
                "remove",
                "rename",
                "setup",
                "transcript"
            ]
        );
    }

    #[tokio::test]
    async fn test_foreign_identifiers_are_ignored() {
        let h = harness().await;
        let inv = invocation(LOBBY, member(5));
        assert!(h.dispatcher.dispatch_control(&inv, "someone_else:button").await.is_none());
        assert!(
            h.dispatcher
                .dispatch_command(&inv, "ban", &CommandArgs::new())
                .await
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_errors_become_private_replies() {
        let h = harness().await;
        let reply = h
            .dispatcher
            .dispatch_command(&invocation(LOBBY, staff(9)), "close", &CommandArgs::new())
            .await
            .unwrap();
        assert!(reply.ephemeral);
        assert_eq!(
            reply.content.as_deref(),
            Some("This command can only be used in a ticket channel.")
        );
    }

    #[tokio::test]
    async fn test_missing_required_option_is_a_fault() {
        let h = harness().await;
        let reply = h
            .dispatcher
            .dispatch_command(&invocation(LOBBY, admin()), "setup", &CommandArgs::new())
            .await
            .unwrap();
        assert_eq!(
            reply.content.as_deref(),
            Some("Something went wrong. Please try again later.")
        );
    }

    #[tokio::test]
    async fn test_stale_entry_point_reports_outdated_panel() {
        let h = harness().await;
        let mut inv = invocation(LOBBY, member(5));
        inv.message_id = Some(MessageId(424242));
        let reply = h
            .dispatcher
            .dispatch_control(&inv, ControlId::CreateTicket.custom_id())
            .await
            .unwrap();
        assert_eq!(reply.content.as_deref(), Some("This ticket panel is outdated."));
    }

    #[test]
    fn test_args_accessors() {
        let args = CommandArgs::new()
            .with("who", OptionValue::User(UserId(3)))
            .with("team", OptionValue::Role(RoleId(4)))
            .with("n", OptionValue::Integer(2));
        assert_eq!(args.target("who"), Some(Target::Member(UserId(3))));
        assert_eq!(args.target("team"), Some(Target::Role(RoleId(4))));
        assert_eq!(args.integer("n"), Some(2));
        assert_eq!(args.string("n"), None);
        assert!(required(args.boolean("flag"), "flag").is_err());
    }
}
