//! Ticket management commands. Used inside a ticket channel.

use super::controls::claim_reply;
use super::{
    CommandArgs, CommandHandler, CommandOption, Context, OptionKind, Reply, SlashCommand, required,
};
use crate::error::TicketResult;
use crate::platform::{Embed, colors};
use async_trait::async_trait;

pub struct AddHandler;

#[async_trait]
impl CommandHandler for AddHandler {
    fn definition(&self) -> SlashCommand {
        SlashCommand::new("add", "Gives a user or role access to this ticket.").option(
            CommandOption::required("target", "User or role to add", OptionKind::Mentionable),
        )
    }

    fn private(&self) -> bool {
        false
    }

    async fn handle(&self, ctx: &Context<'_>, args: &CommandArgs) -> TicketResult<Reply> {
        let target = required(args.target("target"), "target")?;
        ctx.engine
            .add_participant(ctx.channel_id, ctx.actor, target)
            .await?;
        Ok(Reply::public_embed(Embed::new(colors::GREEN).description(
            format!("{} has been added to this ticket.", target.mention()),
        )))
    }
}

pub struct RemoveHandler;

#[async_trait]
impl CommandHandler for RemoveHandler {
    fn definition(&self) -> SlashCommand {
        SlashCommand::new("remove", "Removes a user or role's access to this ticket.").option(
            CommandOption::required("target", "User or role to remove", OptionKind::Mentionable),
        )
    }

    fn private(&self) -> bool {
        false
    }

    async fn handle(&self, ctx: &Context<'_>, args: &CommandArgs) -> TicketResult<Reply> {
        let target = required(args.target("target"), "target")?;
        ctx.engine
            .remove_participant(ctx.channel_id, ctx.actor, target)
            .await?;
        Ok(Reply::public_embed(Embed::new(colors::RED).description(
            format!("{} has been removed from this ticket.", target.mention()),
        )))
    }
}

pub struct CloseHandler;

#[async_trait]
impl CommandHandler for CloseHandler {
    fn definition(&self) -> SlashCommand {
        SlashCommand::new("close", "Closes this ticket.")
    }

    async fn handle(&self, ctx: &Context<'_>, _args: &CommandArgs) -> TicketResult<Reply> {
        // No control message to replace; the engine posts the closed controls.
        ctx.engine
            .close_ticket(ctx.channel_id, ctx.actor, None)
            .await?;
        Ok(Reply::silent())
    }
}

pub struct OpenHandler;

#[async_trait]
impl CommandHandler for OpenHandler {
    fn definition(&self) -> SlashCommand {
        SlashCommand::new("open", "Re-opens this closed ticket.")
    }

    async fn handle(&self, ctx: &Context<'_>, _args: &CommandArgs) -> TicketResult<Reply> {
        ctx.engine
            .reopen_ticket(ctx.channel_id, ctx.actor, None)
            .await?;
        Ok(Reply::silent())
    }
}

pub struct RenameHandler;

#[async_trait]
impl CommandHandler for RenameHandler {
    fn definition(&self) -> SlashCommand {
        SlashCommand::new("rename", "Changes the ticket channel's name.")
            .option(CommandOption::required("name", "New channel name", OptionKind::String))
    }

    fn private(&self) -> bool {
        false
    }

    async fn handle(&self, ctx: &Context<'_>, args: &CommandArgs) -> TicketResult<Reply> {
        let name = required(args.string("name"), "name")?;
        let name = ctx
            .engine
            .rename_ticket(ctx.channel_id, ctx.actor, name)
            .await?;
        Ok(Reply::public_embed(
            Embed::new(colors::BLURPLE).description(format!("Ticket renamed to `{name}`.")),
        ))
    }
}

pub struct ClaimHandler;

#[async_trait]
impl CommandHandler for ClaimHandler {
    fn definition(&self) -> SlashCommand {
        SlashCommand::new("claim", "Claims this ticket, or releases your claim.")
    }

    fn private(&self) -> bool {
        false
    }

    async fn handle(&self, ctx: &Context<'_>, _args: &CommandArgs) -> TicketResult<Reply> {
        let outcome = ctx.engine.toggle_claim(ctx.channel_id, ctx.actor).await?;
        Ok(claim_reply(outcome, ctx.actor.user_id))
    }
}

pub struct CloseRequestHandler;

#[async_trait]
impl CommandHandler for CloseRequestHandler {
    fn definition(&self) -> SlashCommand {
        SlashCommand::new(
            "closerequest",
            "Asks the ticket owner to confirm this ticket can be closed.",
        )
    }

    async fn handle(&self, ctx: &Context<'_>, _args: &CommandArgs) -> TicketResult<Reply> {
        ctx.engine.request_close(ctx.channel_id, ctx.actor).await?;
        Ok(Reply::private("Close request sent."))
    }
}

pub struct TranscriptHandler;

#[async_trait]
impl CommandHandler for TranscriptHandler {
    fn definition(&self) -> SlashCommand {
        SlashCommand::new("transcript", "Generates a transcript of this ticket.")
    }

    async fn handle(&self, ctx: &Context<'_>, _args: &CommandArgs) -> TicketResult<Reply> {
        let staged = ctx.engine.transcript(ctx.channel_id, ctx.actor).await?;
        Ok(Reply::private(format!("Transcript of {}", ctx.channel_id.mention()))
            .with_attachment(staged))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{Harness, harness, invocation, member, open_ticket, setup_panel, staff};
    use super::super::{CommandArgs, OptionValue, Reply};
    use crate::platform::{Access, ChannelId, RoleId, Target, UserId};
    use crate::ticket::Actor;
    use crate::views::ControlId;

    async fn run(
        h: &Harness,
        channel: ChannelId,
        actor: Actor,
        name: &str,
        args: CommandArgs,
    ) -> Reply {
        h.dispatcher
            .dispatch_command(&invocation(channel, actor), name, &args)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_add_and_remove_participants() {
        let h = harness().await;
        let entry = setup_panel(&h, false).await;
        let channel = open_ticket(&h, entry, 5).await;

        let args = CommandArgs::new().with("target", OptionValue::User(UserId(42)));
        let reply = run(&h, channel, staff(9), "add", args.clone()).await;
        assert!(!reply.ephemeral);
        assert_eq!(
            h.platform.channel(channel).unwrap().overwrites[&Target::Member(UserId(42))],
            Access::ReadWrite
        );

        let reply = run(&h, channel, staff(9), "remove", args).await;
        assert!(reply.embed.is_some());
        assert!(
            !h.platform
                .channel(channel)
                .unwrap()
                .overwrites
                .contains_key(&Target::Member(UserId(42)))
        );

        let roles = CommandArgs::new().with("target", OptionValue::Role(RoleId(88)));
        let reply = run(&h, channel, member(5), "add", roles).await;
        assert!(reply.ephemeral);
        assert_eq!(
            reply.content.as_deref(),
            Some("You do not have permission to use this command.")
        );
    }

    #[tokio::test]
    async fn test_close_and_open_commands_post_controls() {
        let h = harness().await;
        let entry = setup_panel(&h, false).await;
        let channel = open_ticket(&h, entry, 5).await;

        let reply = run(&h, channel, member(5), "close", Default::default()).await;
        assert!(reply.is_silent());
        let last = h.platform.messages(channel).last().unwrap().message.clone();
        assert_eq!(last.embed.unwrap().title.as_deref(), Some("Ticket Closed"));

        let reply = run(&h, channel, member(5), "open", Default::default()).await;
        assert!(reply.ephemeral);

        let reply = run(&h, channel, staff(9), "open", Default::default()).await;
        assert!(reply.is_silent());
        let last = h.platform.messages(channel).last().unwrap().message.clone();
        assert_eq!(last.embed.unwrap().title.as_deref(), Some("Ticket Re-Opened"));
    }

    #[tokio::test]
    async fn test_rename_claim_and_close_request() {
        let h = harness().await;
        let entry = setup_panel(&h, true).await;
        let channel = open_ticket(&h, entry, 5).await;

        let args = CommandArgs::new()
            .with("name", OptionValue::String("billing-issue".into()));
        run(&h, channel, staff(9), "rename", args).await;
        assert_eq!(h.platform.channel(channel).unwrap().name, "billing-issue");

        let reply = run(&h, channel, staff(9), "claim", Default::default()).await;
        assert_eq!(reply.embed.unwrap().title.as_deref(), Some("Ticket Claimed"));
        let reply = run(&h, channel, staff(9), "claim", Default::default()).await;
        assert_eq!(reply.embed.unwrap().title.as_deref(), Some("Ticket Unclaimed"));

        let reply = run(&h, channel, staff(9), "closerequest", Default::default()).await;
        assert_eq!(reply.content.as_deref(), Some("Close request sent."));
        let request = h.platform.messages(channel).last().unwrap().message.clone();
        assert_eq!(
            request.buttons[0].custom_id,
            ControlId::ConfirmClose.custom_id()
        );
    }

    #[tokio::test]
    async fn test_transcript_reply_carries_file() {
        let h = harness().await;
        let entry = setup_panel(&h, false).await;
        let channel = open_ticket(&h, entry, 5).await;

        let reply = run(&h, channel, staff(9), "transcript", Default::default()).await;
        assert!(reply.ephemeral);
        let path = reply.attachment.as_ref().unwrap().attachment().path.clone();
        assert!(path.exists());
        drop(reply);
        assert!(!path.exists());
    }
}
