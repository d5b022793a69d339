// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Result type for render operations
pub type Result<T> = std::result::Result<T, RenderError>;

/// Render failures. Nothing here is retried by the engine.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Network unreachable or a non-success HTTP status
    #[error("Transport error{}: {message}", .status.map(|s| format!(" (HTTP {s})")).unwrap_or_default())]
    Transport {
        status: Option<u16>,
        message: String,
    },

    /// The remote stream broke its contract, e.g. ended without `complete`
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Compiler failed{}: {stderr_tail}", .exit_code.map(|c| format!(" with exit code {c}")).unwrap_or_default())]
    Compiler {
        exit_code: Option<i32>,
        stderr_tail: String,
    },

    #[error("Render cancelled")]
    Cancelled,

    #[error("Failed to decode {url}: {message}")]
    Decode { url: String, message: String },

    #[error("Local engine initialization failed: {0}")]
    Init(String),

    #[error("Manifest error: {0}")]
    Manifest(#[from] yantra_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RenderError {
    /// An intentional abort rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RenderError::Cancelled)
    }

    pub(crate) fn transport(status: Option<u16>, message: impl Into<String>) -> Self {
        RenderError::Transport {
            status,
            message: message.into(),
        }
    }

    pub(crate) fn decode(url: impl Into<String>, message: impl ToString) -> Self {
        RenderError::Decode {
            url: url.into(),
            message: message.to_string(),
        }
    }
}

impl From<reqwest::Error> for RenderError {
    fn from(err: reqwest::Error) -> Self {
        RenderError::Transport {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_include_status_and_exit_code() {
        let err = RenderError::Transport {
            status: Some(503),
            message: "unavailable".into(),
        };
        assert_eq!(err.to_string(), "Transport error (HTTP 503): unavailable");

        let err = RenderError::Compiler {
            exit_code: Some(1),
            stderr_tail: "ERROR: Parser error".into(),
        };
        assert_eq!(
            err.to_string(),
            "Compiler failed with exit code 1: ERROR: Parser error"
        );
    }

    #[test]
    fn only_cancellation_is_cancelled() {
        assert!(RenderError::Cancelled.is_cancelled());
        assert!(!RenderError::transport(None, "connection refused").is_cancelled());
        assert!(!RenderError::Protocol("no complete event".into()).is_cancelled());
    }

    #[test]
    fn transport_errors_carry_the_http_status() {
        let err = RenderError::transport(Some(503), "Render request failed: busy");
        assert!(matches!(err, RenderError::Transport { status: Some(503), .. }));
        assert_eq!(err.to_string(), "Transport error (HTTP 503): Render request failed: busy");
    }
}
