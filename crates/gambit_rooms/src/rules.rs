//! Rules engine adapter.
//!
//! [`Board`] wraps a shakmaty position and is the only place in the crate
//! that knows about chess rules. Rooms hand it UCI strings and get back
//! either the played move (with its SAN rendering) or a [`RulesError`];
//! after each move they ask [`Board::terminal`] whether the game is over.

use shakmaty::{fen::Fen, san::San, uci::UciMove, Chess, EnPassantMode, Position};
use std::collections::HashMap;
use thiserror::Error;

use crate::color::Color;

/// Why the engine refused a candidate move.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RulesError {
    #[error("'{0}' is not a UCI move")]
    BadNotation(String),
    #[error("{0} is not legal in this position")]
    Illegal(String),
}

/// A move accepted by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayedMove {
    pub uci: String,
    pub san: String,
    pub color: Color,
}

/// Terminal state of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminal {
    /// The given color delivered mate.
    Checkmate(Color),
    Stalemate,
    InsufficientMaterial,
    ThreefoldRepetition,
    FiftyMoveRule,
}

impl Terminal {
    pub fn winner(self) -> Option<Color> {
        match self {
            Self::Checkmate(color) => Some(color),
            _ => None,
        }
    }
}

/// A chess position plus the bookkeeping needed for repetition detection.
#[derive(Debug, Clone)]
pub struct Board {
    position: Chess,
    seen: HashMap<String, u8>,
}

impl Board {
    pub fn new() -> Self {
        let position = Chess::default();
        let mut seen = HashMap::new();
        seen.insert(repetition_key(&position), 1);
        Self { position, seen }
    }

    /// Side to move.
    pub fn turn(&self) -> Color {
        self.position.turn().into()
    }

    pub fn fen(&self) -> String {
        Fen::from_position(self.position.clone(), EnPassantMode::Legal).to_string()
    }

    /// Validates `uci` against the current position and plays it.
    ///
    /// The position is left untouched when the move is rejected.
    pub fn apply(&mut self, uci: &str) -> Result<PlayedMove, RulesError> {
        let parsed: UciMove = uci
            .trim()
            .parse()
            .map_err(|_| RulesError::BadNotation(uci.to_string()))?;
        let m = parsed
            .to_move(&self.position)
            .map_err(|_| RulesError::Illegal(uci.to_string()))?;

        let color = self.turn();
        let san = San::from_move(&self.position, &m).to_string();
        let next = self
            .position
            .clone()
            .play(&m)
            .map_err(|_| RulesError::Illegal(uci.to_string()))?;

        self.position = next;
        *self.seen.entry(repetition_key(&self.position)).or_insert(0) += 1;

        Ok(PlayedMove {
            uci: parsed.to_string(),
            san,
            color,
        })
    }

    /// Reports whether the game is over in the current position.
    pub fn terminal(&self) -> Option<Terminal> {
        if self.position.is_checkmate() {
            // The side to move is mated.
            return Some(Terminal::Checkmate(self.turn().opposite()));
        }
        if self.position.is_stalemate() {
            return Some(Terminal::Stalemate);
        }
        if self.position.is_insufficient_material() {
            return Some(Terminal::InsufficientMaterial);
        }
        if self
            .seen
            .get(&repetition_key(&self.position))
            .is_some_and(|count| *count >= 3)
        {
            return Some(Terminal::ThreefoldRepetition);
        }
        if self.position.halfmoves() >= 100 {
            return Some(Terminal::FiftyMoveRule);
        }
        None
    }
}

impl Default for Board {
    fn default() -> Self {
        Self::new()
    }
}

/// FEN without the move counters: placement, side to move, castling rights
/// and en passant square identify a repeated position.
fn repetition_key(position: &Chess) -> String {
    let fen = Fen::from_position(position.clone(), EnPassantMode::Legal).to_string();
    fen.split(' ').take(4).collect::<Vec<_>>().join(" ")
}
