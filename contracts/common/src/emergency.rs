//! Emergency Module
//!
//! Protocol-wide pause. While paused every state-mutating user action
//! fails with `ProtocolPaused`; reads and privileged configuration stay
//! available so operators can respond.

use alloc::vec::Vec;

use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};

use crate::errors::{LendError, LendResult};
use crate::types::Address;

// ============================================================================
// Types
// ============================================================================

/// Pause event record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct PauseEvent {
    /// Who initiated the pause
    pub paused_by: Address,
    /// When paused
    pub paused_at: u64,
    /// Who lifted it, once lifted
    pub unpaused_by: Option<Address>,
    /// When lifted
    pub unpaused_at: Option<u64>,
}

/// Emergency state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct EmergencyState {
    /// Global pause flag
    pub paused: bool,
    /// List of pause events
    pub pause_history: Vec<PauseEvent>,
    /// Last state update timestamp
    pub last_update: u64,
}

impl EmergencyState {
    /// Create new emergency state
    pub fn new() -> Self {
        Self::default()
    }
}

// ============================================================================
// Core Emergency Functions
// ============================================================================

/// Check if the pool is paused
pub fn is_paused(state: &EmergencyState) -> bool {
    state.paused
}

/// Fail with `ProtocolPaused` when paused
pub fn ensure_not_paused(state: &EmergencyState) -> LendResult<()> {
    if state.paused {
        return Err(LendError::ProtocolPaused);
    }
    Ok(())
}

/// Pause the pool
pub fn pause(state: &mut EmergencyState, pauser: Address, now: u64) -> LendResult<()> {
    if state.paused {
        return Err(LendError::InvalidInput {
            param: "paused",
            reason: "already paused",
        });
    }

    state.paused = true;
    state.pause_history.push(PauseEvent {
        paused_by: pauser,
        paused_at: now,
        unpaused_by: None,
        unpaused_at: None,
    });
    state.last_update = now;

    Ok(())
}

/// Unpause the pool
pub fn unpause(state: &mut EmergencyState, unpauser: Address, now: u64) -> LendResult<()> {
    if !state.paused {
        return Err(LendError::InvalidInput {
            param: "paused",
            reason: "not paused",
        });
    }

    state.paused = false;

    // Close the latest open pause record
    if let Some(event) = state
        .pause_history
        .iter_mut()
        .rev()
        .find(|e| e.unpaused_at.is_none())
    {
        event.unpaused_by = Some(unpauser);
        event.unpaused_at = Some(now);
    }

    state.last_update = now;
    Ok(())
}

/// Total seconds spent paused up to `now`
pub fn total_paused_time(state: &EmergencyState, now: u64) -> u64 {
    state
        .pause_history
        .iter()
        .map(|e| e.unpaused_at.unwrap_or(now).saturating_sub(e.paused_at))
        .sum()
}
