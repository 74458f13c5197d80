//! Conversion between handler command definitions and serenity's wire types.

use crate::handlers::{CommandArgs, OptionKind, OptionValue, SlashCommand};
use crate::platform::{ChannelId, RoleId, UserId};
use serenity::all::{
    ChannelType, CommandOptionType, CreateCommand, CreateCommandOption, Permissions,
    ResolvedOption, ResolvedValue, Unresolved,
};

/// Registration payload for one slash command.
pub fn build(command: &SlashCommand) -> CreateCommand {
    let mut builder = CreateCommand::new(command.name)
        .description(command.description)
        .dm_permission(false);
    if command.admin_only {
        builder = builder.default_member_permissions(Permissions::ADMINISTRATOR);
    }
    for option in &command.options {
        let kind = match option.kind {
            OptionKind::String => CommandOptionType::String,
            OptionKind::Integer => CommandOptionType::Integer,
            OptionKind::Boolean => CommandOptionType::Boolean,
            OptionKind::Role => CommandOptionType::Role,
            OptionKind::Mentionable => CommandOptionType::Mentionable,
            OptionKind::TextChannel | OptionKind::Category => CommandOptionType::Channel,
        };
        let mut built = CreateCommandOption::new(kind, option.name, option.description)
            .required(option.required);
        match option.kind {
            OptionKind::TextChannel => built = built.channel_types(vec![ChannelType::Text]),
            OptionKind::Category => built = built.channel_types(vec![ChannelType::Category]),
            _ => {}
        }
        builder = builder.add_option(built);
    }
    builder
}

fn value(resolved: &ResolvedValue<'_>) -> Option<OptionValue> {
    let value = match resolved {
        ResolvedValue::String(s) => OptionValue::String((*s).to_string()),
        ResolvedValue::Integer(i) => OptionValue::Integer(*i),
        ResolvedValue::Boolean(b) => OptionValue::Boolean(*b),
        ResolvedValue::User(user, _) => OptionValue::User(UserId(user.id.get())),
        ResolvedValue::Role(role) => OptionValue::Role(RoleId(role.id.get())),
        ResolvedValue::Channel(channel) => OptionValue::Channel(ChannelId(channel.id.get())),
        ResolvedValue::Unresolved(Unresolved::User(id)) => OptionValue::User(UserId(id.get())),
        ResolvedValue::Unresolved(Unresolved::RoleId(id)) => OptionValue::Role(RoleId(id.get())),
        ResolvedValue::Unresolved(Unresolved::Channel(id)) => {
            OptionValue::Channel(ChannelId(id.get()))
        }
        _ => return None,
    };
    Some(value)
}

/// Options of an invoked command, by name. Values we do not use are skipped.
pub fn parse_args(options: &[ResolvedOption<'_>]) -> CommandArgs {
    let mut args = CommandArgs::new();
    for option in options {
        if let Some(value) = value(&option.value) {
            args.insert(option.name, value);
        }
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::Registry;
    use serde_json::{Value, json};

    fn definition(name: &str) -> Value {
        let command = Registry::new()
            .definitions()
            .into_iter()
            .find(|c| c.name == name)
            .unwrap();
        serde_json::to_value(build(&command)).unwrap()
    }

    #[test]
    fn test_admin_commands_require_administrator() {
        let setup = definition("setup");
        assert_eq!(setup["name"], "setup");
        assert_eq!(setup["default_member_permissions"], json!("8"));

        let close = definition("close");
        assert!(close["default_member_permissions"].is_null());
    }

    #[test]
    fn test_options_keep_order_and_required_flags() {
        let setup = definition("setup");
        let options = setup["options"].as_array().unwrap();
        let names: Vec<_> = options.iter().map(|o| o["name"].as_str().unwrap()).collect();
        assert_eq!(
            &names[..5],
            ["name", "support_role", "category", "transcript_channel", "panel_channel"]
        );
        assert_eq!(options[0]["required"], json!(true));
        assert_eq!(options[5]["name"], "extra_role");
        assert_eq!(options[5]["required"], json!(false));
    }

    #[test]
    fn test_resolved_values_convert() {
        assert_eq!(
            value(&ResolvedValue::String("billing")),
            Some(OptionValue::String("billing".into()))
        );
        assert_eq!(value(&ResolvedValue::Integer(3)), Some(OptionValue::Integer(3)));
        assert_eq!(
            value(&ResolvedValue::Boolean(true)),
            Some(OptionValue::Boolean(true))
        );
        assert_eq!(value(&ResolvedValue::Number(1.5)), None);
    }
}
