//! Re-entrancy tracking for replication

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Depth counter shared by every clone of a broadcaster
///
/// Nested broadcasts are allowed. The guard only lets save-side hooks detect
/// that a broadcast is running so they do not start another one.
#[derive(Debug, Clone, Default)]
pub struct RecursionGuard {
    depth: Arc<AtomicUsize>,
}

impl RecursionGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a broadcast as active until the token is dropped
    pub fn enter(&self) -> BroadcastToken {
        self.depth.fetch_add(1, Ordering::SeqCst);
        BroadcastToken {
            depth: Arc::clone(&self.depth),
        }
    }

    pub fn is_broadcasting(&self) -> bool {
        self.depth() > 0
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

/// Held for the duration of one replication
#[derive(Debug)]
pub struct BroadcastToken {
    depth: Arc<AtomicUsize>,
}

impl Drop for BroadcastToken {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_nest() {
        let guard = RecursionGuard::new();
        assert!(!guard.is_broadcasting());

        let outer = guard.enter();
        {
            let _inner = guard.clone().enter();
            assert_eq!(guard.depth(), 2);
        }
        assert_eq!(guard.depth(), 1);

        drop(outer);
        assert!(!guard.is_broadcasting());
    }

    #[test]
    fn test_token_released_on_error_path() {
        fn fails(guard: &RecursionGuard) -> Result<(), String> {
            let _token = guard.enter();
            Err("insert failed".to_string())
        }

        let guard = RecursionGuard::new();
        assert!(fails(&guard).is_err());
        assert_eq!(guard.depth(), 0);
    }
}
