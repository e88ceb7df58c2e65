use std::time::Duration;

use thiserror::Error;

/// Every failure the library surfaces to its caller.
#[derive(Debug, Error)]
pub enum CastError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP status {status} from {url}")]
    HttpStatus { status: u16, url: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("{action} returned UPnP error {code}: {description}")]
    UpnpFault {
        action: String,
        code: u32,
        description: String,
    },

    #[error("device error: {0}")]
    Device(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("control point is not initialized")]
    NotInitialized,

    #[error("control point has been released")]
    Released,

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(Duration),
}

impl CastError {
    pub fn network(err: impl std::fmt::Display) -> Self {
        CastError::Network(err.to_string())
    }

    pub fn device(msg: impl Into<String>) -> Self {
        CastError::Device(msg.into())
    }

    pub fn malformed(msg: impl Into<String>) -> Self {
        CastError::MalformedResponse(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        CastError::InvalidArgument(msg.into())
    }

    /// Transient failures are worth retrying (SOAP) or re-fetching on the
    /// next announce (descriptions). 4xx statuses and UPnP faults are
    /// terminal: the request itself is wrong.
    pub fn is_transient(&self) -> bool {
        match self {
            CastError::Network(_) | CastError::Timeout(_) => true,
            CastError::HttpStatus { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

impl From<std::io::Error> for CastError {
    fn from(err: std::io::Error) -> Self {
        CastError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(CastError::network("connection reset").is_transient());
        assert!(
            CastError::HttpStatus {
                status: 502,
                url: "http://h/ctl".into()
            }
            .is_transient()
        );
        assert!(
            !CastError::HttpStatus {
                status: 404,
                url: "http://h/ctl".into()
            }
            .is_transient()
        );
        assert!(
            !CastError::UpnpFault {
                action: "Play".into(),
                code: 718,
                description: "Invalid InstanceID".into()
            }
            .is_transient()
        );
    }
}
