//! Run lock
//!
//! Two-state `Idle -> Running -> Idle` machine guarding a job. Acquisition
//! is a single compare-and-swap, and the returned guard puts the lock back
//! to `Idle` when dropped, including during unwinding.
//!
//! The lock lives in process memory. Separate processes each hold their own
//! and do not exclude one another.

use std::sync::atomic::{AtomicU8, Ordering};

/// Observable lock state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
}

impl RunState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
        }
    }

    fn from_u8(value: u8) -> Self {
        if value == Self::Running.as_u8() {
            Self::Running
        } else {
            Self::Idle
        }
    }
}

/// Result of asking a locked job to run
#[derive(Debug)]
pub enum TickOutcome<R> {
    /// The job ran to completion
    Completed(R),
    /// Another run held the lock; nothing was done
    Skipped,
}

impl<R> TickOutcome<R> {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }

    pub fn completed(self) -> Option<R> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped => None,
        }
    }
}

#[derive(Debug)]
pub struct RunLock {
    state: AtomicU8,
}

impl Default for RunLock {
    fn default() -> Self {
        Self::new()
    }
}

impl RunLock {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(RunState::Idle.as_u8()),
        }
    }

    /// Move to `Running`, or `None` when a run is already in progress
    pub fn try_acquire(&self) -> Option<RunGuard<'_>> {
        self.state
            .compare_exchange(
                RunState::Idle.as_u8(),
                RunState::Running.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| RunGuard { lock: self })
    }

    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunState::Running
    }
}

/// Held for the duration of a run
#[derive(Debug)]
pub struct RunGuard<'a> {
    lock: &'a RunLock,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.lock
            .state
            .store(RunState::Idle.as_u8(), Ordering::Release);
    }
}
