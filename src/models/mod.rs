//! Data models for signals, intents, and positions.

mod intent;
mod position;
mod signal;

pub use intent::{ExitAction, Fill, ModifyOrCloseIntent, OrderIntent, Quote, TradeIntent};
pub use position::{ExitLevels, ExitState, Position, PositionId, TpStage};
pub use signal::{Direction, Signal};
