pub const NOT_ADMINISTRATOR: &str = "You need the Administrator permission to use this command.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotCommand {
    Add,
    Remove,
    Help,
}

#[derive(Debug, Clone, Copy)]
pub struct CommandSpec {
    pub command: BotCommand,
    pub name: &'static str,
    pub help: &'static str,
    pub admin_only: bool,
    pub hidden: bool,
}

pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: BotCommand::Add,
        name: "add",
        help: "Adds a source or destination channel to the channel connections.",
        admin_only: true,
        hidden: false,
    },
    CommandSpec {
        command: BotCommand::Remove,
        name: "remove",
        help: "Removes a source or destination channel from the channel connections.",
        admin_only: true,
        hidden: false,
    },
    CommandSpec {
        command: BotCommand::Help,
        name: "help",
        help: "Gives you an overview over the available commands.",
        admin_only: false,
        hidden: false,
    },
];

impl BotCommand {
    /// Command names are matched case-sensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        COMMANDS
            .iter()
            .find(|spec| spec.name == name)
            .map(|spec| spec.command)
    }

    pub fn spec(self) -> &'static CommandSpec {
        match self {
            BotCommand::Add => &COMMANDS[0],
            BotCommand::Remove => &COMMANDS[1],
            BotCommand::Help => &COMMANDS[2],
        }
    }

    pub fn requires_admin(self) -> bool {
        self.spec().admin_only
    }
}

pub fn help_text(prefix: &str) -> String {
    let mut description = String::from("**Available Commands:**\n");
    for spec in COMMANDS.iter().filter(|spec| !spec.hidden) {
        description.push_str(&format!("- `{}{}` - {}\n", prefix, spec.name, spec.help));
    }
    description
}
