//! Dry-run execution sink.

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tracing::info;
use uuid::Uuid;

use crate::models::{ExitAction, Fill, ModifyOrCloseIntent, OrderIntent};

use super::ExecutionSink;

/// Fills every order immediately at its reference price.
#[derive(Debug, Default)]
pub struct PaperExecution {
    /// order id -> symbol
    open_orders: DashMap<String, String>,
    instructions: AtomicU64,
}

impl PaperExecution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_order_count(&self) -> usize {
        self.open_orders.len()
    }

    pub fn instructions_applied(&self) -> u64 {
        self.instructions.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ExecutionSink for PaperExecution {
    async fn place_order(&self, order: &OrderIntent) -> Result<Fill> {
        if order.lot_size <= Decimal::ZERO {
            bail!("order size must be positive, got {}", order.lot_size);
        }
        if order.entry_price_hint <= Decimal::ZERO {
            bail!("no reference price for {}", order.symbol);
        }

        let order_id = format!("paper-{}", Uuid::new_v4());
        self.open_orders.insert(order_id.clone(), order.symbol.clone());

        info!(
            order_id = %order_id,
            symbol = %order.symbol,
            direction = %order.direction,
            lots = %order.lot_size,
            price = %order.entry_price_hint,
            stop = %order.stop_price,
            "[PAPER] Order filled"
        );

        Ok(Fill {
            order_id,
            price: order.entry_price_hint,
            timestamp: Utc::now(),
        })
    }

    async fn modify_or_close(&self, instruction: &ModifyOrCloseIntent) -> Result<Fill> {
        self.instructions.fetch_add(1, Ordering::Relaxed);

        info!(
            position_id = instruction.position_id,
            symbol = %instruction.symbol,
            action = ?instruction.action,
            lots = %instruction.lots,
            new_stop = ?instruction.new_stop,
            "[PAPER] Instruction applied"
        );

        if instruction.action == ExitAction::CloseAll {
            self.open_orders.retain(|_, symbol| symbol != &instruction.symbol);
        }

        Ok(Fill {
            order_id: format!("paper-{}", Uuid::new_v4()),
            price: instruction.reference_price,
            timestamp: Utc::now(),
        })
    }
}
