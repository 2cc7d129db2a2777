//! Server error types.

use std::fmt;

/// Errors that can stop the server.
///
/// Per-connection failures never surface here; they are isolated to the
/// session and reclaimed by the server loop. Only listener setup can fail the
/// whole process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerError {
    /// Configuration error (invalid bind address, port out of range, etc.).
    ///
    /// Fatal at startup. Fix configuration and restart.
    Config(String),

    /// Listener-level transport error (address in use, permission denied,
    /// etc.).
    Transport(String),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;

    #[test]
    fn display_names_the_category() {
        assert_eq!(
            ServerError::Config("bad port".into()).to_string(),
            "configuration error: bad port"
        );
        assert_eq!(ServerError::Transport("in use".into()).to_string(), "transport error: in use");
    }

    #[test]
    fn io_errors_are_transport_errors() {
        let err: ServerError = io::Error::new(io::ErrorKind::AddrInUse, "address in use").into();
        assert_eq!(err, ServerError::Transport("address in use".into()));
    }
}
