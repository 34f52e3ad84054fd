use thiserror::Error;

/// A raw line that does not follow the wire grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed line ({reason}): {line}")]
pub struct ParseError {
    pub line: String,
    pub reason: String,
}

impl ParseError {
    pub(crate) fn new(line: &str, reason: impl Into<String>) -> Self {
        Self {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

/// A recognized command whose text does not have the expected shape.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot decode {command} ({reason}): {text}")]
pub struct DecodeError {
    pub command: String,
    pub text: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection closed{}", .0.as_deref().map(|r| format!(": {r}")).unwrap_or_default())]
    Closed(Option<String>),

    #[error("transport error: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum IrcError {
    #[error("connect to {endpoint} failed: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("authentication failed: {0}")]
    AuthenticationFailure(TransportError),

    #[error("invalid client config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, IrcError>;
