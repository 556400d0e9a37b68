//! Scored per-symbol signals produced by the external signal generator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a signal or trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Buy,
    Sell,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Buy => "BUY",
            Direction::Sell => "SELL",
        }
    }

    /// The opposite direction.
    pub fn inverse(&self) -> Self {
        match self {
            Direction::Buy => Direction::Sell,
            Direction::Sell => Direction::Buy,
        }
    }

    /// +1 for buys, -1 for sells. Multiplies a favorable price move into a positive number.
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Buy => Decimal::ONE,
            Direction::Sell => Decimal::NEGATIVE_ONE,
        }
    }

    /// Price `distance` away from `from` in this direction's favor.
    pub fn favorable(&self, from: Decimal, distance: Decimal) -> Decimal {
        from + self.sign() * distance
    }

    /// Price `distance` away from `from` against this direction.
    pub fn adverse(&self, from: Decimal, distance: Decimal) -> Decimal {
        from - self.sign() * distance
    }

    /// True if `price` has reached or passed `level` in this direction's favor.
    pub fn reached(&self, price: Decimal, level: Decimal) -> bool {
        match self {
            Direction::Buy => price >= level,
            Direction::Sell => price <= level,
        }
    }

    /// True if `price` has reached or passed `stop` against this direction.
    pub fn stopped(&self, price: Decimal, stop: Decimal) -> bool {
        match self {
            Direction::Buy => price <= stop,
            Direction::Sell => price >= stop,
        }
    }

    /// True if `candidate` is a tighter (more favorable) stop than `current`.
    pub fn tightens(&self, candidate: Decimal, current: Decimal) -> bool {
        match self {
            Direction::Buy => candidate > current,
            Direction::Sell => candidate < current,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" | "LONG" => Ok(Direction::Buy),
            "SELL" | "SHORT" => Ok(Direction::Sell),
            other => anyhow::bail!("unknown direction: {}", other),
        }
    }
}

/// A scored candidate signal for one symbol, valid for a single evaluation cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    /// Broker symbol (e.g. "EURUSDm")
    pub symbol: String,

    /// Direction suggested by the indicator stack
    pub raw_direction: Direction,

    /// Composite signal strength, 0 to 10
    pub strength_score: f64,

    /// Volume confirmation score, 0 to 10
    #[serde(default)]
    pub volume_score: f64,

    /// Average true range on the primary timeframe
    pub atr: Decimal,

    /// Last traded price when the signal was produced
    pub price: Decimal,

    /// When the signal was produced
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,

    /// Timeframes agreeing with the signal (e.g. "M5+M15+H1")
    #[serde(default)]
    pub timeframe_confluence: String,
}
