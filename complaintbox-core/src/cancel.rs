//! Cooperative cancellation for repository calls

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag a caller flips to abandon in-flight work.
///
/// Clones share the same flag. Store operations check it before touching the
/// disk and between files during scans.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fail with [`Error::Cancelled`] if the token has been cancelled.
    pub fn check(&self, operation: &'static str) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled { operation });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(token.check("read").is_ok());

        clone.cancel();
        assert!(token.is_cancelled());
        let err = token.check("read").unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "read cancelled");
    }
}
