use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use crate::models::StreamState;

/// Lifecycle state of a stream, including the internal-only states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Lifecycle {
    /// Created, never started
    Initialized = 0,
    /// Render pump actively running
    Started = 1,
    /// Render pump halted, resources retained
    Stopped = 2,
    /// Callback signaled end of stream, waiting for the short buffer to be consumed
    Draining = 3,
    /// Drain finished; equivalent to `Stopped` for control purposes
    Drained = 4,
    /// Terminal
    Destroyed = 5,
}

impl Lifecycle {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Lifecycle::Initialized,
            1 => Lifecycle::Started,
            2 => Lifecycle::Stopped,
            3 => Lifecycle::Draining,
            4 => Lifecycle::Drained,
            _ => Lifecycle::Destroyed,
        }
    }

    /// States from which `start` is accepted
    pub fn can_start(&self) -> bool {
        matches!(self, Lifecycle::Initialized | Lifecycle::Stopped | Lifecycle::Drained)
    }

    /// States in which the render pump may still touch the data callback
    pub fn is_running(&self) -> bool {
        matches!(self, Lifecycle::Started | Lifecycle::Draining)
    }

    /// Public state this lifecycle state reports, if any
    pub fn public_state(&self) -> Option<StreamState> {
        match self {
            Lifecycle::Started | Lifecycle::Draining => Some(StreamState::Started),
            Lifecycle::Stopped => Some(StreamState::Stopped),
            Lifecycle::Drained => Some(StreamState::Drained),
            Lifecycle::Initialized | Lifecycle::Destroyed => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Initialized => "INITIALIZED",
            Lifecycle::Started => "STARTED",
            Lifecycle::Stopped => "STOPPED",
            Lifecycle::Draining => "DRAINING",
            Lifecycle::Drained => "DRAINED",
            Lifecycle::Destroyed => "DESTROYED",
        }
    }
}

/// Atomic state cell shared by the control thread and the render thread.
///
/// Every transition is a compare-and-swap, so when two threads race for the
/// same transition exactly one of them wins and gets to notify.
#[derive(Debug)]
pub struct StateCell {
    state: AtomicU8,
    errored: AtomicBool,
}

impl StateCell {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(Lifecycle::Initialized as u8),
            errored: AtomicBool::new(false),
        }
    }

    pub fn load(&self) -> Lifecycle {
        Lifecycle::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move from `from` to `to`; returns false if the state was not `from`
    pub fn transition(&self, from: Lifecycle, to: Lifecycle) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Move to `to` from any of `from`; returns the state that was replaced
    pub fn transition_from_any(&self, from: &[Lifecycle], to: Lifecycle) -> Option<Lifecycle> {
        let mut current = self.load();
        loop {
            if !from.contains(&current) {
                return None;
            }
            match self.state.compare_exchange(
                current as u8,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(current),
                Err(actual) => current = Lifecycle::from_u8(actual),
            }
        }
    }

    /// Unconditionally replace the state, returning the previous one
    pub fn replace(&self, to: Lifecycle) -> Lifecycle {
        Lifecycle::from_u8(self.state.swap(to as u8, Ordering::AcqRel))
    }

    pub fn set_errored(&self, errored: bool) {
        self.errored.store(errored, Ordering::Release);
    }

    pub fn is_errored(&self) -> bool {
        self.errored.load(Ordering::Acquire)
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new()
    }
}
