use thiserror::Error;

/// Failure classes shared by every crawler. Fetch/Parse failures abort the
/// owning task only; NotFound/Config abort the invocation before dispatch.
#[derive(Debug, Error)]
pub enum Error {
    #[error("request failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("{what} not found: '{name}'")]
    NotFound { what: &'static str, name: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("csv write failed: {0}")]
    Csv(#[from] csv::Error),
}

impl Error {
    pub fn fetch(url: impl Into<String>, reason: impl ToString) -> Self {
        Error::Fetch {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
