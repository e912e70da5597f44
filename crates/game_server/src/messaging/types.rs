//! Message type definitions for client-server communication.
//!
//! Every inbound frame is a [`ClientMessage`] envelope. Its `data` is
//! deserialized into the payload struct registered for the event name and
//! checked with `validator` before it is turned into a typed
//! [`Command`](super::Command). Nothing past the router sees raw JSON.

use gambit_rooms::{Color, TokenAmount};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A message sent from a client to the server.
///
/// # Example
///
/// ```json
/// {
///   "event": "makeMove",
///   "data": { "roomId": "K3J9QW2A", "move": "e2e4", "walletAddress": "0xabc" }
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientMessage {
    /// The event name, e.g. `createGame` or `makeMove`
    pub event: String,

    /// The event payload; absent for events without arguments
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticatePayload {
    #[validate(length(min = 1, max = 1024))]
    pub token: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateGamePayload {
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: String,
    pub time_control_minutes: u32,
    #[serde(default)]
    pub increment_seconds: u32,
    #[serde(default)]
    pub stake: Option<TokenAmount>,
    /// Existing on-chain game id to mirror.
    #[validate(length(min = 1, max = 64))]
    pub room_id: Option<String>,
}

/// Shared by `joinGame`, `offerDraw`, `resign` and `reconnectToGame`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RoomWalletPayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MakeMovePayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    /// UCI notation, e.g. `e2e4` or `e7e8q`.
    #[serde(rename = "move")]
    #[validate(length(min = 4, max = 5))]
    pub uci: String,
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RespondToDrawPayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: String,
    pub accepted: bool,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetStakesPayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    pub amount: TokenAmount,
    /// Falls back to the authenticated wallet when omitted.
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PlaceBetPayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: String,
    pub color: Color,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SpectatePayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LeavePayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatPayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    /// Absent for anonymous spectators.
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: Option<String>,
    #[validate(length(min = 1, max = 500))]
    pub message: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetTimeControlPayload {
    #[validate(length(min = 1, max = 64))]
    pub room_id: String,
    #[validate(length(min = 1, max = 128))]
    pub wallet_address: String,
    pub time_control_minutes: u32,
    #[serde(default)]
    pub increment_seconds: u32,
}
