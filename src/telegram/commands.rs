//! Command list published to Telegram's `/` menu.

use teloxide::types::BotCommand;

const COMMANDS: &[(&str, &str)] = &[
    ("start", "Main menu"),
    ("help", "What you can do"),
    ("register", "Ask for access"),
    ("new", "Create a task"),
    ("my_tasks", "Tasks assigned to me"),
    ("created", "Tasks I created"),
    ("group_tasks", "Tasks of my groups"),
    ("archive", "Finished tasks"),
    ("stats", "Statistics"),
    ("cancel", "Abort task creation"),
];

/// Commands shown in the client's command menu.
pub fn bot_commands() -> Vec<BotCommand> {
    COMMANDS
        .iter()
        .map(|(name, description)| BotCommand::new(*name, *description))
        .collect()
}
