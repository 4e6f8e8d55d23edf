// src/acquisition/state.rs
//! Acquisition state shared between the owning thread and the acquisition thread

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::{Deserialize, Serialize};

/// Whether analog packets are ingested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AcquisitionState {
    Stopped,
    Running,
    Paused,
}

impl AcquisitionState {
    fn as_u8(self) -> u8 {
        match self {
            AcquisitionState::Stopped => 0,
            AcquisitionState::Running => 1,
            AcquisitionState::Paused => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => AcquisitionState::Running,
            2 => AcquisitionState::Paused,
            _ => AcquisitionState::Stopped,
        }
    }
}

impl fmt::Display for AcquisitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AcquisitionState::Stopped => "stopped",
            AcquisitionState::Running => "running",
            AcquisitionState::Paused => "paused",
        };
        f.write_str(name)
    }
}

/// Lock-free cell holding an [`AcquisitionState`]
#[derive(Debug)]
pub struct AtomicAcquisitionState(AtomicU8);

impl AtomicAcquisitionState {
    pub fn new(state: AcquisitionState) -> Self {
        Self(AtomicU8::new(state.as_u8()))
    }

    pub fn load(&self) -> AcquisitionState {
        AcquisitionState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn store(&self, state: AcquisitionState) {
        self.0.store(state.as_u8(), Ordering::Release);
    }

    /// Set `new` and return the previous state
    pub fn swap(&self, new: AcquisitionState) -> AcquisitionState {
        AcquisitionState::from_u8(self.0.swap(new.as_u8(), Ordering::AcqRel))
    }

    /// Set `new` only if the current state is `current`.
    ///
    /// On failure the actual state is returned.
    pub fn compare_exchange(
        &self,
        current: AcquisitionState,
        new: AcquisitionState,
    ) -> Result<AcquisitionState, AcquisitionState> {
        self.0
            .compare_exchange(current.as_u8(), new.as_u8(), Ordering::AcqRel, Ordering::Acquire)
            .map(AcquisitionState::from_u8)
            .map_err(AcquisitionState::from_u8)
    }

    pub fn is_running(&self) -> bool {
        self.load() == AcquisitionState::Running
    }
}

impl Default for AtomicAcquisitionState {
    fn default() -> Self {
        Self::new(AcquisitionState::Stopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_stopped() {
        let state = AtomicAcquisitionState::default();
        assert_eq!(state.load(), AcquisitionState::Stopped);
        assert!(!state.is_running());
    }

    #[test]
    fn test_compare_exchange_only_from_expected_state() {
        let state = AtomicAcquisitionState::new(AcquisitionState::Stopped);
        assert_eq!(
            state.compare_exchange(AcquisitionState::Running, AcquisitionState::Paused),
            Err(AcquisitionState::Stopped)
        );

        state.store(AcquisitionState::Running);
        assert_eq!(
            state.compare_exchange(AcquisitionState::Running, AcquisitionState::Paused),
            Ok(AcquisitionState::Running)
        );
        assert_eq!(state.load(), AcquisitionState::Paused);
    }

    #[test]
    fn test_swap_returns_previous() {
        let state = AtomicAcquisitionState::new(AcquisitionState::Paused);
        assert_eq!(state.swap(AcquisitionState::Running), AcquisitionState::Paused);
        assert!(state.is_running());
        assert_eq!(state.load().to_string(), "running");
    }
}
