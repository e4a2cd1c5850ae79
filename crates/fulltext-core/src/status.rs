use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a searcher. Only `Ready -> Running`, `Running -> Completed`
/// and `* -> Terminated` are taken; a terminated searcher never completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SearchStatus {
    Ready = 0,
    Running = 1,
    Completed = 2,
    Terminated = 3,
}

impl SearchStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Terminated,
            _ => Self::Ready,
        }
    }
}

/// Shared, lock-free status cell. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct StatusFlag(Arc<AtomicU8>);

impl Default for StatusFlag {
    fn default() -> Self {
        Self(Arc::new(AtomicU8::new(SearchStatus::Ready as u8)))
    }
}

impl StatusFlag {
    pub fn get(&self) -> SearchStatus {
        SearchStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    fn transition(&self, from: SearchStatus, to: SearchStatus) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `Ready -> Running`. Fails if an operation already started.
    pub fn try_start(&self) -> bool {
        self.transition(SearchStatus::Ready, SearchStatus::Running)
    }

    /// `Running -> Completed`. Fails if the operation was stopped meanwhile.
    pub fn complete(&self) -> bool {
        self.transition(SearchStatus::Running, SearchStatus::Completed)
    }

    /// Unconditionally terminates. Safe to call from any thread at any time.
    pub fn stop(&self) {
        self.0
            .store(SearchStatus::Terminated as u8, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.get() == SearchStatus::Running
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle() {
        let status = StatusFlag::default();
        assert_eq!(status.get(), SearchStatus::Ready);
        assert!(!status.complete());

        assert!(status.try_start());
        assert!(!status.try_start());
        assert!(status.is_running());

        assert!(status.complete());
        assert_eq!(status.get(), SearchStatus::Completed);
        assert!(!status.try_start());
    }

    #[test]
    fn stop_wins_over_completion() {
        let status = StatusFlag::default();
        let handle = status.clone();
        assert!(status.try_start());

        handle.stop();
        assert!(!status.complete());
        assert_eq!(status.get(), SearchStatus::Terminated);
    }
}
