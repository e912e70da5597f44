//! Limits applied to every room.

use crate::error::RoomError;
use crate::stake::TokenAmount;

/// 100 tokens with 18 decimals.
pub const DEFAULT_MAX_STAKE: TokenAmount = TokenAmount::new(100 * 10u128.pow(18));

/// Per-deployment room limits. Built from the `[rooms]` and `[server]`
/// configuration sections and shared by the registry and every room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomPolicy {
    pub min_minutes: u32,
    pub max_minutes: u32,
    pub max_increment_secs: u32,
    pub max_stake: TokenAmount,
    pub max_spectators: usize,
    pub max_chat_messages: usize,
    pub house_fee_bps: u32,
    /// How long a room with no connected player survives.
    pub reconnect_grace_ms: u64,
    /// Inactivity horizon after which any room is swept.
    pub room_ttl_ms: u64,
}

impl Default for RoomPolicy {
    fn default() -> Self {
        Self {
            min_minutes: 1,
            max_minutes: 60,
            max_increment_secs: 60,
            max_stake: DEFAULT_MAX_STAKE,
            max_spectators: 100,
            max_chat_messages: 1000,
            house_fee_bps: 250,
            reconnect_grace_ms: 60_000,
            room_ttl_ms: 24 * 60 * 60 * 1000,
        }
    }
}

impl RoomPolicy {
    pub fn check_time_control(&self, minutes: u32, increment_secs: u32) -> Result<(), RoomError> {
        if minutes < self.min_minutes || minutes > self.max_minutes {
            return Err(RoomError::InvalidConfig(format!(
                "time control must be between {} and {} minutes",
                self.min_minutes, self.max_minutes
            )));
        }
        if increment_secs > self.max_increment_secs {
            return Err(RoomError::InvalidConfig(format!(
                "increment must be at most {} seconds",
                self.max_increment_secs
            )));
        }
        Ok(())
    }

    pub fn check_stake(&self, amount: TokenAmount) -> Result<(), RoomError> {
        if amount > self.max_stake {
            return Err(RoomError::InvalidConfig(format!(
                "stake must not exceed {}",
                self.max_stake
            )));
        }
        Ok(())
    }
}
