//! Gateway - serenity event handler that feeds interactions to the dispatcher.
//!
//! Slash commands are registered when the shard becomes ready. Control
//! clicks are acknowledged immediately and answered with a followup; commands
//! are deferred with the visibility their handler declares, then the deferred
//! response is edited, or replaced when the outcome needs the other visibility.

use super::commands;
use crate::handlers::{Dispatcher, Invocation, Reply};
use crate::platform::discord::{create_attachment, create_embed};
use crate::platform::{ChannelId, GuildId, MessageId, PlatformError, RoleId, UserId};
use crate::telemetry::spans;
use crate::ticket::Actor;
use crate::views::ControlId;
use async_trait::async_trait;
use serenity::all::{
    Command, CommandInteraction, ComponentInteraction, Context, CreateCommand,
    CreateInteractionResponse, CreateInteractionResponseFollowup, EditInteractionResponse,
    EventHandler, Interaction, Member, Permissions, Ready,
};
use serenity::model::id as discord;
use std::sync::Arc;
use thiserror::Error;
use tracing::{Instrument, debug, error, info, warn};

#[derive(Debug, Error)]
enum RespondError {
    #[error(transparent)]
    Discord(#[from] serenity::Error),
    #[error(transparent)]
    Attachment(#[from] PlatformError),
}

/// Interaction entry point for the serenity client.
pub struct Gateway {
    dispatcher: Arc<Dispatcher>,
    /// Register commands to this guild instead of globally.
    command_guild: Option<GuildId>,
}

impl Gateway {
    pub fn new(dispatcher: Arc<Dispatcher>, command_guild: Option<GuildId>) -> Self {
        Self {
            dispatcher,
            command_guild,
        }
    }

    async fn register_commands(&self, ctx: &Context) {
        let definitions: Vec<CreateCommand> = self
            .dispatcher
            .commands()
            .iter()
            .map(commands::build)
            .collect();
        let count = definitions.len();
        let result = match self.command_guild {
            Some(guild) => {
                discord::GuildId::new(guild.get())
                    .set_commands(&ctx.http, definitions)
                    .await
            }
            None => Command::set_global_commands(&ctx.http, definitions).await,
        };
        match result {
            Ok(_) => info!(count, guild = ?self.command_guild, "Registered slash commands"),
            Err(e) => error!(error = %e, "Failed to register slash commands"),
        }
    }

    async fn on_component(&self, ctx: &Context, component: ComponentInteraction) {
        if component.data.custom_id.parse::<ControlId>().is_err() {
            return;
        }
        let (Some(guild_id), Some(member)) = (component.guild_id, component.member.as_ref())
        else {
            debug!(custom_id = %component.data.custom_id, "Ignoring control outside a guild");
            return;
        };

        if let Err(e) = component
            .create_response(&ctx.http, CreateInteractionResponse::Acknowledge)
            .await
        {
            warn!(error = %e, "Failed to acknowledge control");
            return;
        }

        let invocation = Invocation {
            guild_id: GuildId(guild_id.get()),
            channel_id: ChannelId(component.channel_id.get()),
            message_id: Some(MessageId(component.message.id.get())),
            actor: member_actor(member),
        };
        let Some(reply) = self
            .dispatcher
            .dispatch_control(&invocation, &component.data.custom_id)
            .await
        else {
            return;
        };
        if reply.is_silent() {
            return;
        }

        let result = match followup(&reply).await {
            Ok(message) => component
                .create_followup(&ctx.http, message)
                .await
                .map(|_| ())
                .map_err(RespondError::from),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to answer control");
        }
    }

    async fn on_command(&self, ctx: &Context, command: CommandInteraction) {
        let (Some(guild_id), Some(member)) = (command.guild_id, command.member.as_deref()) else {
            debug!(command = %command.data.name, "Ignoring command outside a guild");
            return;
        };

        let private = self.dispatcher.is_private(&command.data.name);
        let deferred = if private {
            command.defer_ephemeral(&ctx.http).await
        } else {
            command.defer(&ctx.http).await
        };
        if let Err(e) = deferred {
            warn!(command = %command.data.name, error = %e, "Failed to defer command");
            return;
        }

        let invocation = Invocation {
            guild_id: GuildId(guild_id.get()),
            channel_id: ChannelId(command.channel_id.get()),
            message_id: None,
            actor: member_actor(member),
        };
        let args = commands::parse_args(&command.data.options());
        let reply = self
            .dispatcher
            .dispatch_command(&invocation, &command.data.name, &args)
            .await
            .unwrap_or_else(|| Reply::private("Unknown command."));

        if let Err(e) = respond(ctx, &command, private, &reply).await {
            warn!(command = %command.data.name, error = %e, "Failed to answer command");
        }
    }
}

#[async_trait]
impl EventHandler for Gateway {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!(
            user = %ready.user.name,
            guilds = ready.guilds.len(),
            "Connected to gateway"
        );
        self.register_commands(&ctx)
            .instrument(spans::startup("register_commands"))
            .await;
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Component(component) => self.on_component(&ctx, component).await,
            Interaction::Command(command) => self.on_command(&ctx, command).await,
            _ => {}
        }
    }
}

/// Answer a deferred command.
async fn respond(
    ctx: &Context,
    command: &CommandInteraction,
    deferred_private: bool,
    reply: &Reply,
) -> Result<(), RespondError> {
    if reply.is_silent() {
        command.delete_response(&ctx.http).await?;
        return Ok(());
    }
    if reply.ephemeral == deferred_private {
        command.edit_response(&ctx.http, edit(reply).await?).await?;
        return Ok(());
    }
    // Visibility of a deferred response is fixed; replace it with a followup.
    command.delete_response(&ctx.http).await?;
    command.create_followup(&ctx.http, followup(reply).await?).await?;
    Ok(())
}

async fn edit(reply: &Reply) -> Result<EditInteractionResponse, PlatformError> {
    let mut builder = EditInteractionResponse::new();
    if let Some(content) = &reply.content {
        builder = builder.content(content);
    }
    if let Some(embed) = &reply.embed {
        builder = builder.embed(create_embed(embed));
    }
    if let Some(staged) = &reply.attachment {
        builder = builder.new_attachment(create_attachment(staged.attachment()).await?);
    }
    Ok(builder)
}

async fn followup(reply: &Reply) -> Result<CreateInteractionResponseFollowup, RespondError> {
    let mut builder = CreateInteractionResponseFollowup::new().ephemeral(reply.ephemeral);
    if let Some(content) = &reply.content {
        builder = builder.content(content);
    }
    if let Some(embed) = &reply.embed {
        builder = builder.embed(create_embed(embed));
    }
    if let Some(staged) = &reply.attachment {
        builder = builder.add_file(create_attachment(staged.attachment()).await?);
    }
    Ok(builder)
}

fn member_actor(member: &Member) -> Actor {
    actor(member.user.id, &member.roles, member.permissions)
}

/// Interaction members carry their resolved channel permissions.
fn actor(user: discord::UserId, roles: &[discord::RoleId], permissions: Option<Permissions>) -> Actor {
    Actor::new(
        UserId(user.get()),
        roles.iter().map(|r| RoleId(r.get())).collect(),
        permissions.is_some_and(|p| p.administrator()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_actor_from_member_parts() {
        let roles = [discord::RoleId::new(7), discord::RoleId::new(8)];
        let admin = actor(
            discord::UserId::new(5),
            &roles,
            Some(Permissions::ADMINISTRATOR | Permissions::SEND_MESSAGES),
        );
        assert_eq!(admin.user_id, UserId(5));
        assert_eq!(admin.roles, vec![RoleId(7), RoleId(8)]);
        assert!(admin.is_admin);

        let member = actor(discord::UserId::new(6), &[], Some(Permissions::SEND_MESSAGES));
        assert!(!member.is_admin);
        assert!(!actor(discord::UserId::new(6), &[], None).is_admin);
    }
}
