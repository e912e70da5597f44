//! Wager lifecycle and settlement planning.

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::color::Color;
use crate::error::RoomError;
use crate::identity::{RoomId, WalletAddress};

/// Token amount in the smallest unit. Travels as a decimal string so that
/// 18-decimal values survive JSON clients that parse numbers as doubles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenAmount(u128);

impl TokenAmount {
    pub const ZERO: TokenAmount = TokenAmount(0);

    pub const fn new(units: u128) -> Self {
        Self(units)
    }

    pub const fn units(self) -> u128 {
        self.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn saturating_mul(self, factor: u128) -> Self {
        Self(self.0.saturating_mul(factor))
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// `basis_points` / 10 000 of this amount, rounded down.
    pub fn fraction_bps(self, basis_points: u32) -> Self {
        let bps = u128::from(basis_points);
        Self(
            (self.0 / 10_000)
                .saturating_mul(bps)
                .saturating_add(self.0 % 10_000 * bps / 10_000),
        )
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TokenAmount {
    type Err = RoomError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RoomError::InvalidInput(format!(
                "'{s}' is not a non-negative integer amount"
            )));
        }
        trimmed
            .parse::<u128>()
            .map(Self)
            .map_err(|_| RoomError::InvalidInput(format!("amount '{s}' is too large")))
    }
}

impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AmountVisitor;

        impl de::Visitor<'_> for AmountVisitor {
            type Value = TokenAmount;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer or a decimal string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<TokenAmount, E> {
                Ok(TokenAmount(u128::from(v)))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<TokenAmount, E> {
                u128::try_from(v)
                    .map(TokenAmount)
                    .map_err(|_| E::custom("amount must not be negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<TokenAmount, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(AmountVisitor)
    }
}

/// Stake state of one room.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stake {
    pub amount: TokenAmount,
    pub white_bettor: Option<WalletAddress>,
    pub black_bettor: Option<WalletAddress>,
    pub locked: bool,
}

impl Stake {
    pub fn new(amount: TokenAmount) -> Self {
        Self {
            amount,
            ..Self::default()
        }
    }

    pub fn bettor(&self, color: Color) -> Option<&WalletAddress> {
        match color {
            Color::White => self.white_bettor.as_ref(),
            Color::Black => self.black_bettor.as_ref(),
        }
    }

    /// A game may start once nothing is wagered or both bets are in.
    pub fn ready(&self) -> bool {
        self.amount.is_zero() || self.locked
    }

    /// Changes the wagered amount. Any bets already placed against the
    /// previous amount are withdrawn.
    pub fn set_amount(&mut self, amount: TokenAmount) -> Result<(), RoomError> {
        if self.locked {
            return Err(RoomError::StakesLocked);
        }
        if amount != self.amount {
            self.white_bettor = None;
            self.black_bettor = None;
        }
        self.amount = amount;
        Ok(())
    }

    /// Records a bet. Returns true if this bet locked the stake.
    pub fn place_bet(&mut self, color: Color, wallet: WalletAddress) -> Result<bool, RoomError> {
        if self.locked {
            return Err(RoomError::StakesLocked);
        }
        if self.amount.is_zero() {
            return Err(RoomError::NoStakeConfigured);
        }
        let slot = match color {
            Color::White => &mut self.white_bettor,
            Color::Black => &mut self.black_bettor,
        };
        if slot.is_some() {
            return Err(RoomError::BetAlreadyPlaced(color));
        }
        *slot = Some(wallet);
        self.locked = self.white_bettor.is_some() && self.black_bettor.is_some();
        Ok(self.locked)
    }

    /// Splits the pot for a finished game. A win pays the whole pot, less
    /// the house fee, to the winner; anything else refunds each bettor.
    /// Unlocked stakes are always refunded.
    pub fn payouts(&self, winner: Option<Color>, house_fee_bps: u32) -> (Vec<Payout>, TokenAmount) {
        if self.amount.is_zero() {
            return (Vec::new(), TokenAmount::ZERO);
        }
        if let (true, Some(color)) = (self.locked, winner) {
            if let Some(wallet) = self.bettor(color) {
                let pot = self.amount.saturating_mul(2);
                let fee = pot.fraction_bps(house_fee_bps);
                return (
                    vec![Payout {
                        wallet: wallet.clone(),
                        amount: pot.saturating_sub(fee),
                    }],
                    fee,
                );
            }
        }
        let refunds = Color::ALL
            .iter()
            .filter_map(|c| self.bettor(*c))
            .map(|wallet| Payout {
                wallet: wallet.clone(),
                amount: self.amount,
            })
            .collect();
        (refunds, TokenAmount::ZERO)
    }
}

/// A transfer owed once a game is settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payout {
    pub wallet: WalletAddress,
    pub amount: TokenAmount,
}

/// Everything the chain needs to record a finished staked game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRequest {
    pub room_id: RoomId,
    pub winner: Option<Color>,
    pub winner_wallet: Option<WalletAddress>,
    pub reason: String,
    pub moves: Vec<String>,
    pub stake: TokenAmount,
    /// Wallets whose `stake` is held for this game.
    #[serde(default)]
    pub bettors: Vec<WalletAddress>,
    pub payouts: Vec<Payout>,
    pub house_fee: TokenAmount,
}

/// Where a room's on-chain settlement stands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum SettlementStatus {
    #[default]
    None,
    Pending,
    Confirmed {
        transaction: String,
    },
    Failed {
        attempts: u32,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wallet(s: &str) -> WalletAddress {
        WalletAddress::parse(s).unwrap()
    }

    #[test]
    fn amounts_travel_as_strings() {
        let amount = TokenAmount::new(100_000_000_000_000_000_000);
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "\"100000000000000000000\"");
        let back: TokenAmount = serde_json::from_str(&json).unwrap();
        assert_eq!(back, amount);
        let from_number: TokenAmount = serde_json::from_str("42").unwrap();
        assert_eq!(from_number.units(), 42);
        assert!(serde_json::from_str::<TokenAmount>("-1").is_err());
        assert!("1.5".parse::<TokenAmount>().is_err());
    }

    #[test]
    fn second_bet_locks_the_stake() {
        let mut stake = Stake::new(TokenAmount::new(10));
        assert!(!stake.place_bet(Color::White, wallet("0xa")).unwrap());
        assert_eq!(
            stake.place_bet(Color::White, wallet("0xa")),
            Err(RoomError::BetAlreadyPlaced(Color::White))
        );
        assert!(stake.place_bet(Color::Black, wallet("0xb")).unwrap());
        assert!(stake.ready());
        assert_eq!(stake.set_amount(TokenAmount::new(20)), Err(RoomError::StakesLocked));
        assert_eq!(stake.amount, TokenAmount::new(10));
    }

    #[test]
    fn changing_amount_withdraws_bets() {
        let mut stake = Stake::new(TokenAmount::new(10));
        stake.place_bet(Color::White, wallet("0xa")).unwrap();
        stake.set_amount(TokenAmount::new(11)).unwrap();
        assert!(stake.white_bettor.is_none());
    }

    #[test]
    fn win_pays_pot_minus_fee() {
        let mut stake = Stake::new(TokenAmount::new(1_000));
        stake.place_bet(Color::White, wallet("0xa")).unwrap();
        stake.place_bet(Color::Black, wallet("0xb")).unwrap();
        let (payouts, fee) = stake.payouts(Some(Color::Black), 250);
        assert_eq!(fee, TokenAmount::new(50));
        assert_eq!(
            payouts,
            vec![Payout {
                wallet: wallet("0xb"),
                amount: TokenAmount::new(1_950)
            }]
        );
    }

    #[test]
    fn draw_refunds_each_bettor() {
        let mut stake = Stake::new(TokenAmount::new(7));
        stake.place_bet(Color::White, wallet("0xa")).unwrap();
        stake.place_bet(Color::Black, wallet("0xb")).unwrap();
        let (payouts, fee) = stake.payouts(None, 250);
        assert_eq!(fee, TokenAmount::ZERO);
        assert_eq!(payouts.len(), 2);
        assert!(payouts.iter().all(|p| p.amount == TokenAmount::new(7)));
    }

    #[test]
    fn fee_rounds_down_for_large_amounts() {
        let pot = TokenAmount::new(u128::MAX / 4);
        assert!(pot.fraction_bps(10_000) <= pot);
        assert_eq!(TokenAmount::new(39).fraction_bps(250), TokenAmount::ZERO);
    }
}
