use tokio_tungstenite::tungstenite;

/// Failure of a REST call against the chat backend.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("server is unavailable")]
    Unavailable,

    #[error("request timed out")]
    Timeout,

    #[error("server returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Request(reqwest::Error),
}

impl TransportError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Unavailable
        } else if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(err)
        }
    }
}

/// Failure on the push path (connect, socket I/O, frame decoding).
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("push server is unavailable")]
    Unavailable,

    #[error("websocket handshake failed: {0}")]
    Handshake(String),

    #[error("push connection closed")]
    Closed,

    #[error("undecodable push frame: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ChannelError {
    pub fn from_tungstenite(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Io(io_err)
                if matches!(
                    io_err.kind(),
                    std::io::ErrorKind::ConnectionRefused
                        | std::io::ErrorKind::ConnectionReset
                        | std::io::ErrorKind::ConnectionAborted
                ) =>
            {
                Self::Unavailable
            }
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                Self::Closed
            }
            other => Self::Handshake(other.to_string()),
        }
    }
}

/// Input rejected locally before any network call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("message text is empty")]
    EmptyMessage,

    #[error("conversation title is empty")]
    EmptyTitle,
}

/// Error surfaced from store and engine operations to the presentation layer.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("conversation {0} is not open")]
    NotOpen(i64),

    #[error("sync engine has stopped")]
    EngineGone,
}

impl SyncError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
