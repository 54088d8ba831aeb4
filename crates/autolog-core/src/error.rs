//! Error taxonomy shared by the job engine, learning layer, and facade.
//!
//! | Variant | Raised when |
//! |---------|-------------|
//! | [`RcaError::Validation`] | bad input: empty error set, duplicate active job, out-of-range values |
//! | [`RcaError::NotFound`] | unknown job, pattern, memory, or log file |
//! | [`RcaError::Upstream`] | the analysis client failed or returned unusable data |
//! | [`RcaError::Persistence`] | a store read or write failed |

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RcaError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("upstream call failed: {0}")]
    Upstream(String),

    #[error("persistence failure: {0:#}")]
    Persistence(anyhow::Error),
}

pub type RcaResult<T> = Result<T, RcaError>;

impl RcaError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        RcaError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        RcaError::Validation(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        RcaError::Upstream(message.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RcaError::NotFound { .. })
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, RcaError::Validation(_))
    }
}

/// Wrap a store failure. Store methods return `anyhow::Result`; callers
/// use `.map_err(persistence)?` at the boundary.
pub fn persistence(err: anyhow::Error) -> RcaError {
    RcaError::Persistence(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_display() {
        let err = RcaError::not_found("job", "abc");
        assert_eq!(err.to_string(), "job not found: abc");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_persistence_renders_chain() {
        let err = persistence(anyhow::anyhow!("disk full").context("insert job"));
        let text = err.to_string();
        assert!(text.contains("insert job"));
        assert!(text.contains("disk full"));
    }
}
