#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    New,
    History,
    Restore(String),
    ClearHistory,
    /// `/model` with no argument.
    ShowModel,
    /// `None` selects automatic routing (`/model auto`).
    SetModel(Option<String>),
    Models,
    Quit,
    MissingArgument { command: String, usage: &'static str },
    Unknown(String),
}

pub const HELP_TEXT: &str = "\
Commands:
  /help              show this help
  /new               start a new conversation
  /history           list saved conversations
  /restore <id>      reopen a saved conversation
  /clear-history     delete all saved conversations
  /model [name|auto] show or pin the model, `auto` for routing
  /models            list models offered by the backend
  /quit              exit
Ctrl-C stops the response in progress, Ctrl-D exits.";

pub fn parse_slash_command(input: &str) -> Option<SlashCommand> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or(trimmed).to_string();
    let argument = parts
        .next()
        .map(str::trim)
        .filter(|argument| !argument.is_empty());

    let parsed = match command.as_str() {
        "/help" => SlashCommand::Help,
        "/new" => SlashCommand::New,
        "/history" => SlashCommand::History,
        "/restore" => match argument {
            Some(id) => SlashCommand::Restore(id.to_string()),
            None => SlashCommand::MissingArgument {
                command,
                usage: "/restore <id>",
            },
        },
        "/clear-history" => SlashCommand::ClearHistory,
        "/model" => match argument {
            None => SlashCommand::ShowModel,
            Some(name) if name.eq_ignore_ascii_case("auto") => SlashCommand::SetModel(None),
            Some(name) => SlashCommand::SetModel(Some(name.to_string())),
        },
        "/models" => SlashCommand::Models,
        "/quit" | "/exit" => SlashCommand::Quit,
        _ => SlashCommand::Unknown(command),
    };

    Some(parsed)
}
