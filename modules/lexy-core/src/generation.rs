use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Monotonic counter handing out tokens to in-flight requests.
///
/// Issuing a new token makes every earlier token stale, so a slow response
/// can tell it was overtaken before writing shared state.
#[derive(Debug, Clone, Default)]
pub struct RequestGeneration {
    current: Arc<AtomicU64>,
}

impl RequestGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> RequestToken {
        let id = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        RequestToken {
            id,
            current: Arc::clone(&self.current),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RequestToken {
    id: u64,
    current: Arc<AtomicU64>,
}

impl RequestToken {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire) == self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_token_supersedes_older() {
        let generation = RequestGeneration::new();
        let first = generation.next();
        assert!(first.is_current());

        let second = generation.next();
        assert!(!first.is_current());
        assert!(second.is_current());
        assert!(second.id() > first.id());
    }

    #[test]
    fn clones_share_the_counter() {
        let generation = RequestGeneration::new();
        let token = generation.next();
        let _ = generation.clone().next();
        assert!(!token.is_current());
    }
}
