//! Panel administration commands.

use super::{
    CommandArgs, CommandHandler, CommandOption, Context, OptionKind, Reply, SlashCommand, required,
};
use crate::db::{Panel, PanelUpdate};
use crate::error::TicketResult;
use crate::panel::PanelDraft;
use crate::platform::{Embed, RoleId, colors};
use async_trait::async_trait;

/// Options shared by `/setup` and `/editpanel`, all optional there.
const SHARED_OPTIONS: [CommandOption; 5] = [
    CommandOption::optional("extra_role", "A second support role", OptionKind::Role),
    CommandOption::optional("claimable", "Whether staff can claim tickets", OptionKind::Boolean),
    CommandOption::optional("description", "Text shown on the panel", OptionKind::String),
    CommandOption::optional("button_text", "Label of the create-ticket button", OptionKind::String),
    CommandOption::optional("welcome_message", "First message in a new ticket", OptionKind::String),
];

fn roles(args: &CommandArgs) -> Option<Vec<RoleId>> {
    let primary = args.role("support_role")?;
    let mut roles = vec![primary];
    if let Some(extra) = args.role("extra_role")
        && extra != primary
    {
        roles.push(extra);
    }
    Some(roles)
}

fn owned(args: &CommandArgs, name: &str) -> Option<String> {
    args.string(name).map(str::to_string)
}

pub struct SetupHandler;

#[async_trait]
impl CommandHandler for SetupHandler {
    fn definition(&self) -> SlashCommand {
        let mut command = SlashCommand::new("setup", "Creates a new ticket panel.")
            .admin_only()
            .option(CommandOption::required("name", "Panel title", OptionKind::String))
            .option(CommandOption::required(
                "support_role",
                "Role that handles these tickets",
                OptionKind::Role,
            ))
            .option(CommandOption::required(
                "category",
                "Category new tickets are created in",
                OptionKind::Category,
            ))
            .option(CommandOption::required(
                "transcript_channel",
                "Channel that receives transcripts",
                OptionKind::TextChannel,
            ))
            .option(CommandOption::required(
                "panel_channel",
                "Channel the panel is posted in",
                OptionKind::TextChannel,
            ));
        command.options.extend(SHARED_OPTIONS);
        command
    }

    async fn handle(&self, ctx: &Context<'_>, args: &CommandArgs) -> TicketResult<Reply> {
        let draft = PanelDraft {
            name: required(owned(args, "name"), "name")?,
            support_roles: required(roles(args), "support_role")?,
            category_id: required(args.channel("category"), "category")?,
            transcript_channel_id: required(
                args.channel("transcript_channel"),
                "transcript_channel",
            )?,
            panel_channel_id: required(args.channel("panel_channel"), "panel_channel")?,
            claimable: args.boolean("claimable").unwrap_or(false),
            description: owned(args, "description"),
            button_text: owned(args, "button_text"),
            welcome_message: owned(args, "welcome_message"),
        };
        let panel = ctx
            .panels
            .create_panel(ctx.guild_id, ctx.actor, draft)
            .await?;
        Ok(Reply::private(format!(
            "Panel `{}` created with id `{}`.",
            panel.name, panel.id
        )))
    }
}

pub struct EditPanelHandler;

#[async_trait]
impl CommandHandler for EditPanelHandler {
    fn definition(&self) -> SlashCommand {
        let mut command = SlashCommand::new("editpanel", "Edits an existing ticket panel.")
            .admin_only()
            .option(CommandOption::required("panel", "Panel id (see /panels)", OptionKind::Integer))
            .option(CommandOption::optional("name", "Panel title", OptionKind::String))
            .option(CommandOption::optional(
                "support_role",
                "Replaces the support roles (with extra_role)",
                OptionKind::Role,
            ))
            .option(CommandOption::optional(
                "category",
                "Category new tickets are created in",
                OptionKind::Category,
            ))
            .option(CommandOption::optional(
                "transcript_channel",
                "Channel that receives transcripts",
                OptionKind::TextChannel,
            ));
        command.options.extend(SHARED_OPTIONS);
        command
    }

    async fn handle(&self, ctx: &Context<'_>, args: &CommandArgs) -> TicketResult<Reply> {
        let panel_id = required(args.integer("panel"), "panel")?;
        let update = PanelUpdate {
            name: owned(args, "name"),
            support_roles: roles(args),
            category_id: args.channel("category"),
            transcript_channel_id: args.channel("transcript_channel"),
            claimable: args.boolean("claimable"),
            description: owned(args, "description"),
            button_text: owned(args, "button_text"),
            welcome_message: owned(args, "welcome_message"),
        };
        let panel = ctx
            .panels
            .edit_panel(ctx.guild_id, ctx.actor, panel_id, update)
            .await?;
        Ok(Reply::private(format!("Panel `{}` updated.", panel.name)))
    }
}

pub struct PanelsHandler;

fn describe(panel: &Panel) -> String {
    let roles: Vec<_> = panel.support_roles.iter().map(|r| r.mention()).collect();
    let posted = panel
        .channel_id
        .map(|c| c.mention())
        .unwrap_or_else(|| "not posted".to_string());
    format!(
        "Posted in: {posted}\nSupport: {}\nCategory: `{}`\nTranscripts: {}\nClaimable: {}",
        roles.join(", "),
        panel.category_id,
        panel.transcript_channel_id.mention(),
        if panel.claimable { "yes" } else { "no" }
    )
}

#[async_trait]
impl CommandHandler for PanelsHandler {
    fn definition(&self) -> SlashCommand {
        SlashCommand::new("panels", "Lists the ticket panels of this server.").admin_only()
    }

    async fn handle(&self, ctx: &Context<'_>, _args: &CommandArgs) -> TicketResult<Reply> {
        let panels = ctx.panels.list_panels(ctx.guild_id, ctx.actor).await?;
        if panels.is_empty() {
            return Ok(Reply::private("No panels yet. Create one with /setup."));
        }
        let embed = panels.iter().fold(
            Embed::new(colors::BLURPLE).title("Ticket Panels"),
            |embed, panel| embed.field(format!("#{} {}", panel.id, panel.name), describe(panel), false),
        );
        Ok(Reply::private_embed(embed))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{LOBBY, SUPPORT, admin, harness, invocation, setup_panel, staff};
    use super::super::{CommandArgs, OptionValue};
    use super::*;

    #[test]
    fn test_definitions_share_optional_fields() {
        let setup = SetupHandler.definition();
        let edit = EditPanelHandler.definition();
        assert!(setup.admin_only && edit.admin_only);
        for option in SHARED_OPTIONS {
            assert!(setup.options.contains(&option));
            assert!(edit.options.contains(&option));
        }
        assert!(edit.options.iter().filter(|o| o.required).count() == 1);
    }

    #[test]
    fn test_extra_role_joins_support_role() {
        let args = CommandArgs::new()
            .with("support_role", OptionValue::Role(RoleId(1)))
            .with("extra_role", OptionValue::Role(RoleId(2)));
        assert_eq!(roles(&args), Some(vec![RoleId(1), RoleId(2)]));

        let args = CommandArgs::new().with("extra_role", OptionValue::Role(RoleId(2)));
        assert_eq!(roles(&args), None);
    }

    #[tokio::test]
    async fn test_setup_edit_and_list() {
        let h = harness().await;
        let old_entry = setup_panel(&h, false).await;

        let args = CommandArgs::new()
            .with("panel", OptionValue::Integer(1))
            .with("button_text", OptionValue::String("Get help".into()));
        let reply = h
            .dispatcher
            .dispatch_command(&invocation(LOBBY, admin()), "editpanel", &args)
            .await
            .unwrap();
        assert_eq!(reply.content.as_deref(), Some("Panel `Support` updated."));

        let posted = h.platform.messages(LOBBY);
        assert_eq!(posted.len(), 1);
        assert_ne!(posted[0].id, old_entry);
        assert_eq!(posted[0].message.buttons[0].label, "Get help");

        let reply = h
            .dispatcher
            .dispatch_command(&invocation(LOBBY, admin()), "panels", &CommandArgs::new())
            .await
            .unwrap();
        let embed = reply.embed.unwrap();
        assert_eq!(embed.fields.len(), 1);
        assert_eq!(embed.fields[0].name, "#1 Support");
        assert!(embed.fields[0].value.contains(&SUPPORT.mention()));
    }

    #[tokio::test]
    async fn test_panel_commands_need_admin() {
        let h = harness().await;
        let reply = h
            .dispatcher
            .dispatch_command(&invocation(LOBBY, staff(9)), "panels", &CommandArgs::new())
            .await
            .unwrap();
        assert_eq!(
            reply.content.as_deref(),
            Some("Only administrators can manage ticket panels.")
        );
    }
}
