//! Terminal front end for the agent chat stream: environment config, the
//! client facade over `chat_session`, slash commands and a plain-text
//! transcript renderer.

pub mod client;
pub mod commands;
pub mod config;
pub mod logging;
pub mod render;

pub use client::{ChatClient, ClientError};
pub use commands::{parse_slash_command, SlashCommand, HELP_TEXT};
pub use config::{ConfigError, EnvConfig, TransportKind};
pub use logging::init_logging;
pub use render::TerminalRenderer;
