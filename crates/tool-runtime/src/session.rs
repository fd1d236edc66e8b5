//! Session liveness shared between a provider connection and the stubs
//! built from it.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Connection state as seen by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeState {
    /// No live session; discovery and invocation are rejected.
    Disconnected,
    /// Session established; discovery and invocation are allowed.
    Ready,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeState::Disconnected => write!(f, "disconnected"),
            BridgeState::Ready => write!(f, "ready"),
        }
    }
}

/// Cloneable handle on one session's liveness.
///
/// A provider creates the token open when its session is established and
/// closes it on teardown. Closing is one-way: a closed token never reopens,
/// so stubs holding a clone stay dead.
#[derive(Clone)]
pub struct SessionToken {
    open: Arc<AtomicBool>,
}

impl SessionToken {
    /// A token for a freshly established session.
    pub fn open() -> Self {
        Self {
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// A token that was never connected.
    pub fn closed() -> Self {
        Self {
            open: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Mark the session torn down. Returns `true` if this call closed it.
    pub fn close(&self) -> bool {
        self.open.swap(false, Ordering::AcqRel)
    }

    pub fn state(&self) -> BridgeState {
        if self.is_open() {
            BridgeState::Ready
        } else {
            BridgeState::Disconnected
        }
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionToken")
            .field("state", &self.state())
            .finish()
    }
}
