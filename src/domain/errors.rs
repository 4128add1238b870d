use thiserror::Error;

/// Errors surfaced by any tier implementing the `Store` trait family.
///
/// Business-rule failures (`NotFound`, `UniquenessViolation`) are mostly
/// expressed by returning `false`/`None` rather than raising, per the
/// propagation policy; these variants exist for the call sites that must
/// distinguish "didn't happen" from "backend is down".
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("uniqueness violation: {0}")]
    UniquenessViolation(String),

    #[error("backend unavailable ({backend}): {source}")]
    BackendUnavailable {
        backend: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error("operation `{operation}` is unsupported by the {backend} tier")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    #[error("data inconsistency detected: {0}")]
    DataInconsistency(String),
}

impl StoreError {
    pub fn unavailable(backend: &'static str, source: impl Into<anyhow::Error>) -> Self {
        Self::BackendUnavailable {
            backend,
            source: source.into(),
        }
    }

    pub fn unsupported(backend: &'static str, operation: &'static str) -> Self {
        Self::Unsupported { backend, operation }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_unsupported_with_backend_and_operation() {
        let err = StoreError::unsupported("hot", "query_trades");
        let msg = err.to_string();
        assert!(msg.contains("hot"));
        assert!(msg.contains("query_trades"));
    }

    #[test]
    fn formats_backend_unavailable_with_source() {
        let err = StoreError::unavailable("warm", anyhow::anyhow!("connection refused"));
        assert!(err.to_string().contains("connection refused"));
    }
}
