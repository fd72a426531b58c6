//! Terminal command handlers.
//!
//! A line of input is parsed against the current [`Route`] into a
//! [`Command`], then executed against the [`Shell`]. Each sub-module groups
//! the commands of one view.

pub mod auth;
pub mod chat;
pub mod group;

use std::path::PathBuf;

pub use auth::AuthCommand;
pub use chat::ChatCommand;
pub use group::GroupCommand;

use crate::files;
use crate::lock::Visibility;
use crate::setup;
use crate::shell::{Route, Shell};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Reload,
    Reset,
    Setup,
    /// Simulated app visibility change.
    Visibility(Visibility),
    /// Stage a file: a chat attachment, or the signup photo.
    Attach(PathBuf),
    Detach,
    Logout,
    Auth(AuthCommand),
    Chat(ChatCommand),
    Group(GroupCommand),
}

/// Whether the event loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Parse one input line for the given view. `Err` carries a usage hint.
pub fn parse(route: &Route, line: &str) -> Result<Command, String> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return match route {
            Route::Chat => Ok(Command::Chat(ChatCommand::Send(line.to_string()))),
            Route::Lock if !line.is_empty() => Ok(Command::Auth(AuthCommand::Unlock(line.to_string()))),
            _ if line.is_empty() => Err(String::new()),
            _ => Err("Commands start with '/'. Type /help.".to_string()),
        };
    };
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    let global = match name {
        "help" => Some(Command::Help),
        "quit" | "exit" => Some(Command::Quit),
        "reload" => Some(Command::Reload),
        "reset" => Some(Command::Reset),
        "setup" => Some(Command::Setup),
        "hide" => Some(Command::Visibility(Visibility::Hidden)),
        "show" => Some(Command::Visibility(Visibility::Visible)),
        _ => None,
    };
    if let Some(command) = global {
        return Ok(command);
    }

    match route {
        Route::Auth => match name {
            "attach" => attach(args),
            "detach" => Ok(Command::Detach),
            _ => auth::parse(name, args).map(Command::Auth),
        },
        Route::Lock => match name {
            "logout" => Ok(Command::Logout),
            "pin" => auth::parse(name, args).map(Command::Auth),
            _ => Err(unknown(name)),
        },
        Route::Chat => match name {
            "attach" => attach(args),
            "detach" => Ok(Command::Detach),
            "logout" => Ok(Command::Logout),
            "test" => Ok(Command::Auth(AuthCommand::TestConnection)),
            _ => match group::parse(name, args) {
                Some(command) => command.map(Command::Group),
                None => chat::parse(name, args).map(Command::Chat),
            },
        },
        Route::ConfigurationMissing | Route::Loading | Route::Crashed { .. } => Err(unknown(name)),
    }
}

fn attach(args: &str) -> Result<Command, String> {
    if args.is_empty() {
        return Err("Usage: /attach <path>".to_string());
    }
    Ok(Command::Attach(PathBuf::from(args)))
}

pub(crate) fn unknown(name: &str) -> String {
    format!("Unknown command /{name}. Type /help.")
}

/// Usage lines for the given view.
pub fn help(route: &Route) -> Vec<&'static str> {
    let mut lines = match route {
        Route::Auth => auth::HELP.to_vec(),
        Route::Lock => vec!["<pin>  or  /pin <pin>   unlock", "/logout               sign out"],
        Route::Chat => [chat::HELP, group::HELP].concat(),
        Route::ConfigurationMissing | Route::Loading | Route::Crashed { .. } => Vec::new(),
    };
    lines.extend([
        "/setup                 show the backend setup guide",
        "/reload                start over",
        "/reset                 clear local data, then start over",
        "/hide, /show           simulate leaving and returning to the app",
        "/quit",
    ]);
    lines
}

pub(crate) async fn execute(shell: &mut Shell, command: Command) -> Flow {
    match command {
        Command::Quit => return Flow::Quit,
        Command::Help => {
            let text = help(&shell.route()).join("\n");
            shell.set_notice(text);
        }
        Command::Setup => shell.set_notice(setup::guide()),
        Command::Reload => shell.reload().await,
        Command::Reset => shell.reset().await,
        Command::Visibility(visibility) => shell.on_visibility(visibility),
        Command::Attach(path) => match files::load_attachment(&path).await {
            Ok(attachment) => {
                shell.set_notice(format!("Attached {}", attachment.preview));
                shell.pending.push(attachment);
            }
            Err(e) => shell.set_notice(e.user_message()),
        },
        Command::Detach => {
            shell.pending.clear();
            shell.clear_notice();
        }
        Command::Logout => shell.logout().await,
        Command::Auth(command) => auth::execute(shell, command).await,
        Command::Chat(command) => chat::execute(shell, command).await,
        Command::Group(command) => group::execute(shell, command).await,
    }
    Flow::Continue
}
