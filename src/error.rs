use thiserror::Error;

#[derive(Debug, Error)]
pub enum TelnetError {
    #[error("connect timed out")]
    ConnectTimeout,
    #[error("connect failed: {0}")]
    ConnectFailed(#[source] std::io::Error),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("session is not at an idle shell prompt")]
    Busy,
    #[error("session closed")]
    Closed,
    #[error("command interrupted by renewed option negotiation")]
    Interrupted,
    #[error("invalid prompt pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),
}

pub type TelnetResult<T> = Result<T, TelnetError>;
