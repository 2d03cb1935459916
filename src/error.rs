use core::fmt;

pub type Result<T, E = Error> = core::result::Result<T, E>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Status(u16),
    Timeout,
    Transport,
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "http {code}"),
            Self::Timeout => f.write_str("timeout"),
            Self::Transport => f.write_str("transport"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("fetch failed ({kind}): {detail}")]
    Fetch { kind: FetchKind, detail: String },
    #[error("unexpected page shape: {0}")]
    Parse(String),
    #[error("automation setup failed: {0:#}")]
    Setup(anyhow::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Transport and page-shape failures are worth another attempt; everything else ends the run.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Fetch { .. } | Self::Parse(_))
    }

    pub fn parse(detail: impl Into<String>) -> Self {
        Self::Parse(detail.into())
    }

    pub fn status(code: u16, url: &str) -> Self {
        Self::Fetch {
            kind: FetchKind::Status(code),
            detail: url.to_owned(),
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let kind = if err.is_timeout() {
            FetchKind::Timeout
        } else if let Some(status) = err.status() {
            FetchKind::Status(status.as_u16())
        } else {
            FetchKind::Transport
        };
        Self::Fetch {
            kind,
            detail: err.to_string(),
        }
    }
}
