//! Parsing of raw client frames into typed commands.
//!
//! The router is the schema boundary: it decodes the envelope, picks the
//! payload type for the event name, runs its validation rules and
//! normalizes identities. Room handlers only ever see a [`Command`].

use gambit_rooms::{Color, RoomId, TimeControl, TokenAmount, WalletAddress};
use serde::de::DeserializeOwned;
use tracing::debug;
use validator::Validate;

use crate::error::GatewayError;
use crate::messaging::types::*;

/// A validated inbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GetLobby,
    Authenticate {
        token: String,
    },
    CreateGame {
        wallet: WalletAddress,
        time_control: TimeControl,
        stake: TokenAmount,
        room_id: Option<RoomId>,
    },
    JoinGame {
        room_id: RoomId,
        wallet: WalletAddress,
    },
    MakeMove {
        room_id: RoomId,
        wallet: WalletAddress,
        uci: String,
    },
    OfferDraw {
        room_id: RoomId,
        wallet: WalletAddress,
    },
    RespondToDraw {
        room_id: RoomId,
        wallet: WalletAddress,
        accepted: bool,
    },
    Resign {
        room_id: RoomId,
        wallet: WalletAddress,
    },
    SetStakes {
        room_id: RoomId,
        wallet: Option<WalletAddress>,
        amount: TokenAmount,
    },
    PlaceBet {
        room_id: RoomId,
        wallet: WalletAddress,
        color: Color,
    },
    Reconnect {
        room_id: RoomId,
        wallet: WalletAddress,
    },
    Spectate {
        room_id: RoomId,
        wallet: Option<WalletAddress>,
    },
    Leave {
        room_id: RoomId,
    },
    Chat {
        room_id: RoomId,
        wallet: Option<WalletAddress>,
        message: String,
    },
    SetTimeControl {
        room_id: RoomId,
        wallet: WalletAddress,
        time_control: TimeControl,
    },
}

impl Command {
    /// Wire name of the inbound event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetLobby => "getLobby",
            Self::Authenticate { .. } => "authenticate",
            Self::CreateGame { .. } => "createGame",
            Self::JoinGame { .. } => "joinGame",
            Self::MakeMove { .. } => "makeMove",
            Self::OfferDraw { .. } => "offerDraw",
            Self::RespondToDraw { .. } => "respondToDraw",
            Self::Resign { .. } => "resign",
            Self::SetStakes { .. } => "setStakes",
            Self::PlaceBet { .. } => "placeBet",
            Self::Reconnect { .. } => "reconnectToGame",
            Self::Spectate { .. } => "spectateGame",
            Self::Leave { .. } => "leaveGame",
            Self::Chat { .. } => "sendChatMessage",
            Self::SetTimeControl { .. } => "setTimeControl",
        }
    }

    /// The room this command targets, if any.
    pub fn room_id(&self) -> Option<&RoomId> {
        match self {
            Self::GetLobby | Self::Authenticate { .. } => None,
            Self::CreateGame { room_id, .. } => room_id.as_ref(),
            Self::JoinGame { room_id, .. }
            | Self::MakeMove { room_id, .. }
            | Self::OfferDraw { room_id, .. }
            | Self::RespondToDraw { room_id, .. }
            | Self::Resign { room_id, .. }
            | Self::SetStakes { room_id, .. }
            | Self::PlaceBet { room_id, .. }
            | Self::Reconnect { room_id, .. }
            | Self::Spectate { room_id, .. }
            | Self::Leave { room_id }
            | Self::Chat { room_id, .. }
            | Self::SetTimeControl { room_id, .. } => Some(room_id),
        }
    }

    /// The wallet the client claims to act as, if the payload names one.
    pub fn claimed_wallet(&self) -> Option<&WalletAddress> {
        match self {
            Self::GetLobby | Self::Authenticate { .. } | Self::Leave { .. } => None,
            Self::CreateGame { wallet, .. }
            | Self::JoinGame { wallet, .. }
            | Self::MakeMove { wallet, .. }
            | Self::OfferDraw { wallet, .. }
            | Self::RespondToDraw { wallet, .. }
            | Self::Resign { wallet, .. }
            | Self::PlaceBet { wallet, .. }
            | Self::Reconnect { wallet, .. }
            | Self::SetTimeControl { wallet, .. } => Some(wallet),
            Self::SetStakes { wallet, .. }
            | Self::Spectate { wallet, .. }
            | Self::Chat { wallet, .. } => wallet.as_ref(),
        }
    }

    /// Whether the command changes room state. Only these are subject to
    /// `require_auth`; lobby reads, authentication, spectating and leaving
    /// are always allowed.
    pub fn is_room_mutation(&self) -> bool {
        !matches!(
            self,
            Self::GetLobby | Self::Authenticate { .. } | Self::Spectate { .. } | Self::Leave { .. }
        )
    }
}

/// Parses and validates one text frame.
///
/// # Arguments
///
/// * `text` - The raw frame text, expected to be a JSON envelope
///
/// # Returns
///
/// The typed command, or a `GatewayError` with a validation-class kind if
/// the envelope, payload or any field is malformed.
pub fn parse_command(text: &str) -> Result<Command, GatewayError> {
    let message: ClientMessage =
        serde_json::from_str(text).map_err(|e| GatewayError::Malformed(e.to_string()))?;
    debug!(event = %message.event, "📨 Parsing client message");

    let data = message.data;
    let command = match message.event.as_str() {
        "getLobby" => Command::GetLobby,
        "authenticate" => {
            let p: AuthenticatePayload = payload(data)?;
            Command::Authenticate { token: p.token }
        }
        "createGame" => {
            let p: CreateGamePayload = payload(data)?;
            Command::CreateGame {
                wallet: wallet(&p.wallet_address)?,
                time_control: TimeControl {
                    minutes: p.time_control_minutes,
                    increment_secs: p.increment_seconds,
                },
                stake: p.stake.unwrap_or(TokenAmount::ZERO),
                room_id: p.room_id.as_deref().map(RoomId::from),
            }
        }
        "joinGame" => {
            let p: RoomWalletPayload = payload(data)?;
            Command::JoinGame {
                room_id: RoomId::new(p.room_id),
                wallet: wallet(&p.wallet_address)?,
            }
        }
        "makeMove" => {
            let p: MakeMovePayload = payload(data)?;
            Command::MakeMove {
                room_id: RoomId::new(p.room_id),
                wallet: wallet(&p.wallet_address)?,
                uci: p.uci.trim().to_string(),
            }
        }
        "offerDraw" => {
            let p: RoomWalletPayload = payload(data)?;
            Command::OfferDraw {
                room_id: RoomId::new(p.room_id),
                wallet: wallet(&p.wallet_address)?,
            }
        }
        "respondToDraw" => {
            let p: RespondToDrawPayload = payload(data)?;
            Command::RespondToDraw {
                room_id: RoomId::new(p.room_id),
                wallet: wallet(&p.wallet_address)?,
                accepted: p.accepted,
            }
        }
        "resign" => {
            let p: RoomWalletPayload = payload(data)?;
            Command::Resign {
                room_id: RoomId::new(p.room_id),
                wallet: wallet(&p.wallet_address)?,
            }
        }
        "setStakes" => {
            let p: SetStakesPayload = payload(data)?;
            Command::SetStakes {
                room_id: RoomId::new(p.room_id),
                wallet: p.wallet_address.as_deref().map(wallet).transpose()?,
                amount: p.amount,
            }
        }
        "placeBet" => {
            let p: PlaceBetPayload = payload(data)?;
            Command::PlaceBet {
                room_id: RoomId::new(p.room_id),
                wallet: wallet(&p.wallet_address)?,
                color: p.color,
            }
        }
        "reconnectToGame" => {
            let p: RoomWalletPayload = payload(data)?;
            Command::Reconnect {
                room_id: RoomId::new(p.room_id),
                wallet: wallet(&p.wallet_address)?,
            }
        }
        "spectateGame" => {
            let p: SpectatePayload = payload(data)?;
            Command::Spectate {
                room_id: RoomId::new(p.room_id),
                wallet: p.wallet_address.as_deref().map(wallet).transpose()?,
            }
        }
        "leaveGame" => {
            let p: LeavePayload = payload(data)?;
            Command::Leave {
                room_id: RoomId::new(p.room_id),
            }
        }
        "sendChatMessage" => {
            let p: ChatPayload = payload(data)?;
            Command::Chat {
                room_id: RoomId::new(p.room_id),
                wallet: p.wallet_address.as_deref().map(wallet).transpose()?,
                message: p.message,
            }
        }
        "setTimeControl" => {
            let p: SetTimeControlPayload = payload(data)?;
            Command::SetTimeControl {
                room_id: RoomId::new(p.room_id),
                wallet: wallet(&p.wallet_address)?,
                time_control: TimeControl {
                    minutes: p.time_control_minutes,
                    increment_secs: p.increment_seconds,
                },
            }
        }
        other => return Err(GatewayError::UnknownEvent(other.to_string())),
    };
    Ok(command)
}

fn payload<T: DeserializeOwned + Validate>(data: serde_json::Value) -> Result<T, GatewayError> {
    let parsed: T =
        serde_json::from_value(data).map_err(|e| GatewayError::Validation(e.to_string()))?;
    parsed.validate()?;
    Ok(parsed)
}

fn wallet(raw: &str) -> Result<WalletAddress, GatewayError> {
    Ok(WalletAddress::parse(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gambit_rooms::ErrorKind;

    #[test]
    fn parses_make_move() {
        let cmd = parse_command(
            r#"{"event":"makeMove","data":{"roomId":"ABCD1234","move":"e2e4","walletAddress":" 0xABC "}}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::MakeMove {
                room_id: RoomId::from("ABCD1234"),
                wallet: WalletAddress::parse("0xabc").unwrap(),
                uci: "e2e4".into(),
            }
        );
        assert!(cmd.is_room_mutation());
    }

    #[test]
    fn create_game_defaults() {
        let cmd = parse_command(
            r#"{"event":"createGame","data":{"walletAddress":"0xa","timeControlMinutes":5}}"#,
        )
        .unwrap();
        match cmd {
            Command::CreateGame {
                time_control,
                stake,
                room_id,
                ..
            } => {
                assert_eq!(time_control.increment_secs, 0);
                assert_eq!(stake, TokenAmount::ZERO);
                assert_eq!(room_id, None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn stake_accepts_decimal_strings() {
        let cmd = parse_command(
            r#"{"event":"setStakes","data":{"roomId":"R1","amount":"1000000000000000000000"}}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            Command::SetStakes {
                room_id: RoomId::from("R1"),
                wallet: None,
                amount: TokenAmount::new(1_000_000_000_000_000_000_000),
            }
        );
    }

    #[test]
    fn get_lobby_needs_no_data() {
        assert_eq!(parse_command(r#"{"event":"getLobby"}"#).unwrap(), Command::GetLobby);
    }

    #[test]
    fn rejects_bad_input_as_validation_errors() {
        let cases = [
            "not json",
            r#"{"event":"makeMove","data":{"roomId":"R","walletAddress":"0xa"}}"#,
            r#"{"event":"makeMove","data":{"roomId":"R","move":"e2","walletAddress":"0xa"}}"#,
            r#"{"event":"joinGame","data":{"roomId":"","walletAddress":"0xa"}}"#,
            r#"{"event":"joinGame","data":{"roomId":"R","walletAddress":"   "}}"#,
            r#"{"event":"placeBet","data":{"roomId":"R","walletAddress":"0xa","color":"green"}}"#,
            r#"{"event":"teleport","data":{}}"#,
        ];
        for case in cases {
            let err = parse_command(case).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ValidationError, "case {case}");
        }
    }

    #[test]
    fn chat_length_is_bounded() {
        let long = "x".repeat(501);
        let frame = serde_json::json!({
            "event": "sendChatMessage",
            "data": { "roomId": "R", "message": long }
        });
        assert!(matches!(
            parse_command(&frame.to_string()),
            Err(GatewayError::Validation(_))
        ));
    }
}
