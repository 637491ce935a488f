// =============================================================================
// Error taxonomy
// =============================================================================
//
// Three failure domains, none of which may kill the process:
//   - UpstreamError:     a Polygon request failed or returned a payload we
//                        cannot use. The worker skips the affected symbol for
//                        the current cycle; the API surface forwards the
//                        upstream status and body to the client.
//   - PersistenceError:  a registry read/write failed. Surfaced as a 500 on
//                        the request path; inside the worker it is logged and
//                        the pass is retried on the next tick.
//   - NotificationError: delivery failed. Logged, never blocks further rule
//                        evaluation in the same pass.
// =============================================================================

use thiserror::Error;

/// Failures talking to the market-data provider.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Non-2xx response; carries what the upstream actually said so callers
    /// can forward it instead of inventing a message.
    #[error("upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("POLYGON_API_KEY is not set")]
    MissingApiKey,
}

impl UpstreamError {
    /// HTTP status to report to an API client for this failure.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Status { status, .. } => *status,
            _ => 502,
        }
    }
}

/// Failures reading or writing the watchlist/rules registry.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures delivering a notification.
#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("no recipient configured")]
    NoRecipient,

    #[error("email not enabled (missing SMTP env)")]
    NotEnabled,

    #[error("transport error: {0}")]
    Transport(String),
}
