use agentwire_common::FromMessage;

/// Failures of the channel to a server, as opposed to errors a server reports
/// about a tool.
#[derive(Debug, thiserror::Error)]
pub enum McpTransportError {
    #[error("'{method}' timed out after {secs}s (no response from server)")]
    Timeout { method: String, secs: u64 },
    #[error("connection to server closed")]
    Closed,
    #[error("server returned HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("server error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("reply id {got} does not echo request id {expected}")]
    MismatchedId { expected: u64, got: serde_json::Value },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] McpTransportError),
    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    /// True when the channel itself failed (pipe closed, timeout, HTTP
    /// failure), so the conversation cannot trust the exchange happened.
    /// Server-reported RPC errors and malformed payloads are not.
    #[must_use]
    pub fn is_transport_failure(&self) -> bool {
        match self {
            Self::Io(_) | Self::Reqwest(_) => true,
            Self::Transport(e) => !matches!(e, McpTransportError::Rpc { .. }),
            Self::SerdeJson(_) | Self::Message { .. } => false,
        }
    }
}

impl FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

agentwire_common::impl_context!();

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_channel_failures() {
        assert!(Error::from(McpTransportError::Closed).is_transport_failure());
        assert!(
            Error::from(McpTransportError::Timeout {
                method: "tools/call".into(),
                secs: 30
            })
            .is_transport_failure()
        );
        assert!(
            !Error::from(McpTransportError::Rpc {
                code: -32602,
                message: "bad params".into()
            })
            .is_transport_failure()
        );
        assert!(!Error::message("no result").is_transport_failure());
    }

    #[test]
    fn context_wraps_messages() {
        let err = Err::<(), _>(std::fmt::Error)
            .context("writing frame")
            .unwrap_err();
        assert_eq!(err.to_string(), "writing frame: an error occurred when formatting an argument");
    }
}
