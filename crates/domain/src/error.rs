/// Shared error type used across all Arbor crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// No provider or session owner could be resolved.
    #[error("not found: {0}")]
    NotFound(String),

    /// Registry or store stayed unresponsive past the retry budget.
    #[error("timeout: {0}")]
    Timeout(String),

    /// A response could not be matched to the request it claims to answer.
    #[error("correlation: {0}")]
    Correlation(String),

    /// The external TTL store could not be reached.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// Caller input that can never succeed (empty ids, bad separators).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid tree: {0}")]
    InvalidTree(String),

    /// The target actor's mailbox is closed (actor stopped).
    #[error("mailbox closed: {0}")]
    Mailbox(String),

    #[error("config: {0}")]
    Config(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stable, lowercase tag for logs and API payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Timeout(_) => "timeout",
            Self::Correlation(_) => "correlation",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::InvalidRequest(_) => "invalid_request",
            Self::InvalidTree(_) => "invalid_tree",
            Self::Mailbox(_) => "mailbox_closed",
            Self::Config(_) => "config",
            Self::Io(_) => "io",
            Self::Json(_) => "json",
            Self::Other(_) => "other",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
