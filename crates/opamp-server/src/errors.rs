//! Transport error types.

use thiserror::Error;

/// Errors starting or running the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listen address could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address from configuration.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// Any other socket error.
    #[error("server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_display_names_address() {
        let err = ServerError::Bind {
            addr: "0.0.0.0:1".into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(err.to_string(), "failed to bind 0.0.0.0:1: denied");
    }

    #[test]
    fn io_from_conversion() {
        let err: ServerError = std::io::Error::other("boom").into();
        assert!(matches!(err, ServerError::Io(_)));
    }
}
