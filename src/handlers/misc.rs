use super::{CommandArgs, CommandHandler, Context, Reply, SlashCommand};
use crate::error::TicketResult;
use crate::views;
use async_trait::async_trait;

pub struct HelpHandler;

#[async_trait]
impl CommandHandler for HelpHandler {
    fn definition(&self) -> SlashCommand {
        SlashCommand::new("help", "Lists the bot's commands.")
    }

    async fn handle(&self, _ctx: &Context<'_>, _args: &CommandArgs) -> TicketResult<Reply> {
        Ok(Reply::private_embed(views::help()))
    }
}
