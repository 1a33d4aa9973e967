use std::io::{self, BufRead, Write};

use quasar_chat::{
    init_logging, parse_slash_command, ChatClient, EnvConfig, SlashCommand, TerminalRenderer,
    HELP_TEXT,
};
use session_store::Role;
use signal_hook::consts::SIGINT;
use tokio::runtime::Runtime;

fn main() -> io::Result<()> {
    let config = EnvConfig::from_env().map_err(io::Error::other)?;
    init_logging(config.log_filter.as_deref());

    let cwd = std::env::current_dir()?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let mut client = ChatClient::from_config(&config, &cwd).map_err(io::Error::other)?;
    signal_hook::flag::register(SIGINT, client.cancellation().signal())?;

    let mut renderer = TerminalRenderer::new(io::stdout());
    prompt()?;
    for line in io::stdin().lock().lines() {
        let line = line?;
        let keep_running = match parse_slash_command(&line) {
            Some(command) => run_command(command, &mut client, &runtime)?,
            None if line.trim().is_empty() => true,
            None => {
                if let Err(error) = runtime.block_on(client.send(&line, &mut renderer)) {
                    eprintln!("{error}");
                }
                true
            }
        };
        if !keep_running {
            break;
        }
        prompt()?;
    }
    Ok(())
}

fn prompt() -> io::Result<()> {
    let mut out = io::stdout().lock();
    write!(out, "> ")?;
    out.flush()
}

fn run_command(
    command: SlashCommand,
    client: &mut ChatClient,
    runtime: &Runtime,
) -> io::Result<bool> {
    let mut out = io::stdout().lock();
    match command {
        SlashCommand::Help => writeln!(out, "{HELP_TEXT}")?,
        SlashCommand::New => match client.conversation_mut().start_new() {
            Ok(session) => writeln!(out, "new conversation {}", session.id)?,
            Err(error) => writeln!(out, "{error}")?,
        },
        SlashCommand::History => {
            let active = client.conversation().active_session().id.clone();
            let sessions = client.conversation().history().sessions();
            if sessions.is_empty() {
                writeln!(out, "no saved conversations")?;
            }
            for session in sessions {
                let marker = if session.id == active { '*' } else { ' ' };
                writeln!(
                    out,
                    "{marker} {}  {}  ({} messages)",
                    session.id,
                    session.title,
                    session.messages.len()
                )?;
            }
        }
        SlashCommand::Restore(id) => match client.conversation_mut().restore(&id) {
            Ok(session) => {
                writeln!(out, "restored \"{}\"", session.title)?;
                for message in &session.messages {
                    let speaker = match message.role {
                        Role::User => "you",
                        Role::Assistant => "assistant",
                    };
                    writeln!(out, "{speaker}: {}", message.content)?;
                }
            }
            Err(error) => writeln!(out, "{error}")?,
        },
        SlashCommand::ClearHistory => match client.conversation_mut().clear_history() {
            Ok(()) => writeln!(out, "history cleared")?,
            Err(error) => writeln!(out, "{error}")?,
        },
        SlashCommand::ShowModel => writeln!(
            out,
            "model: {}",
            client.conversation().selected_model().unwrap_or("auto")
        )?,
        SlashCommand::SetModel(model) => {
            let label = model.clone().unwrap_or_else(|| "auto".to_owned());
            match client.conversation_mut().set_selected_model(model) {
                Ok(()) => writeln!(out, "model: {label}")?,
                Err(error) => writeln!(out, "{error}")?,
            }
        }
        SlashCommand::Models => match runtime.block_on(client.list_models()) {
            Ok(models) => {
                for model in models {
                    writeln!(out, "{}  {}", model.selection_key(), model.label())?;
                }
            }
            Err(error) => writeln!(out, "{error}")?,
        },
        SlashCommand::Quit => return Ok(false),
        SlashCommand::MissingArgument { command, usage } => {
            writeln!(out, "{command}: usage {usage}")?
        }
        SlashCommand::Unknown(command) => {
            writeln!(out, "unknown command {command}, try /help")?
        }
    }
    Ok(true)
}
