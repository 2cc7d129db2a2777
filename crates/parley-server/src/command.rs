//! Command interpreter for inbound chat messages.
//!
//! Routing is decided solely by the first whitespace-delimited token: if it
//! starts with `/` the message is a command, otherwise it is chat. Commands
//! are matched case-insensitively. Interpretation is read-only with respect to
//! the registry; renames come back as an [`Outcome::Rename`] for the server
//! loop to defer to the end of the pass.

use crate::registry::{RegistryError, SessionId, SessionRegistry};

/// Reply to `/help`.
pub const HELP_TEXT: &str = "/help - show this list of commands\n\
                             /list - list everyone connected\n\
                             /setname <name> - change your display name";

/// Reply when `/setname` asks for a name someone already holds.
pub const NAME_TAKEN: &str = "This name is already taken!";

/// Reply to any unrecognised command or wrong argument count.
pub const UNKNOWN_COMMAND: &str = "This command does not exist";

/// Reply to `/setname` without an argument.
pub const MISSING_NAME: &str = "No name registered!";

/// Reply to a connection that arrives while the server is at capacity.
pub const SERVER_FULL: &str = "Server is full";

/// A parsed inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    /// Plain chat text, carried verbatim.
    Chat(&'a str),
    /// `/help`
    Help,
    /// `/list`
    List,
    /// `/setname <name>`
    SetName(&'a str),
    /// `/setname` with no argument
    MissingName,
    /// Any other `/...` message, or a known command with the wrong arity.
    Unknown,
}

impl<'a> Command<'a> {
    /// Parse one message.
    pub fn parse(text: &'a str) -> Self {
        let mut tokens = text.split_whitespace();
        let Some(head) = tokens.next().filter(|t| t.starts_with('/')) else {
            return Self::Chat(text);
        };
        let args: Vec<&'a str> = tokens.collect();

        match (head.to_lowercase().as_str(), args.as_slice()) {
            ("/help", []) => Self::Help,
            ("/list", []) => Self::List,
            ("/setname", [name]) => Self::SetName(*name),
            ("/setname", []) => Self::MissingName,
            _ => Self::Unknown,
        }
    }
}

/// What the server loop should do with a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Deliver to every live session.
    Broadcast(String),
    /// Deliver only to the sender.
    Reply(String),
    /// Queue a rename for the end of the pass and broadcast the notice now.
    Rename {
        /// Lower-cased requested name
        new_name: String,
        /// Public announcement of the change
        notice: String,
    },
}

/// Interpret a message from `origin` against the registry as it stands.
///
/// # Errors
///
/// - `RegistryError::NotFound` if `origin` is not registered. The server loop
///   never drains a removed session, so this indicates a logic bug.
pub fn interpret<C>(
    origin: SessionId,
    text: &str,
    registry: &SessionRegistry<C>,
) -> Result<Outcome, RegistryError> {
    let name = registry.lookup(origin)?;

    let outcome = match Command::parse(text) {
        Command::Chat(line) => Outcome::Broadcast(format!("{name} says: {line}")),
        Command::Help => Outcome::Reply(HELP_TEXT.to_string()),
        Command::List => Outcome::Reply(registry.names().join("\n")),
        Command::SetName(requested) => {
            if registry.is_name_taken(requested) {
                Outcome::Reply(NAME_TAKEN.to_string())
            } else {
                let new_name = requested.to_lowercase();
                let notice = format!("{name} changed name to {new_name}");
                Outcome::Rename { new_name, notice }
            }
        },
        Command::MissingName => Outcome::Reply(MISSING_NAME.to_string()),
        Command::Unknown => Outcome::Reply(UNKNOWN_COMMAND.to_string()),
    };

    Ok(outcome)
}
