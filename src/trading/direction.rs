//! Direction policy: contrarian reversal or volume-confirmed direct execution.

use serde::{Deserialize, Serialize};

use crate::models::{Direction, Signal};

use super::SignalConfig;

/// The single direction policy active for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Trade the opposite of the raw signal
    Contrarian,
    /// Trade the raw signal, only on high volume confirmation
    VolumeGated,
}

impl PolicyMode {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "contrarian" | "reverse" => Some(Self::Contrarian),
            "volume" | "volume_gated" | "direct" => Some(Self::VolumeGated),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyMode::Contrarian => "contrarian",
            PolicyMode::VolumeGated => "volume_gated",
        }
    }
}

/// Why a signal did not produce a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    WeakSignal,
    LowVolume,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::WeakSignal => f.write_str("strength below minimum"),
            SkipReason::LowVolume => f.write_str("volume below threshold"),
        }
    }
}

/// Outcome of resolving a signal's direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Execute(Direction),
    Skipped(SkipReason),
}

type Resolver = fn(&Signal, &SignalConfig) -> Resolution;

fn resolve_contrarian(signal: &Signal, thresholds: &SignalConfig) -> Resolution {
    if signal.strength_score < thresholds.min_signal_strength {
        return Resolution::Skipped(SkipReason::WeakSignal);
    }
    Resolution::Execute(signal.raw_direction.inverse())
}

fn resolve_volume_gated(signal: &Signal, thresholds: &SignalConfig) -> Resolution {
    if signal.volume_score < thresholds.volume_threshold {
        return Resolution::Skipped(SkipReason::LowVolume);
    }
    if signal.strength_score < thresholds.min_signal_strength {
        return Resolution::Skipped(SkipReason::WeakSignal);
    }
    Resolution::Execute(signal.raw_direction)
}

/// Maps raw signals to executable directions under one fixed mode.
#[derive(Debug, Clone)]
pub struct DirectionPolicy {
    mode: PolicyMode,
    thresholds: SignalConfig,
    resolver: Resolver,
}

impl DirectionPolicy {
    pub fn new(mode: PolicyMode, thresholds: SignalConfig) -> Self {
        let resolver: Resolver = match mode {
            PolicyMode::Contrarian => resolve_contrarian,
            PolicyMode::VolumeGated => resolve_volume_gated,
        };
        Self { mode, thresholds, resolver }
    }

    pub fn mode(&self) -> PolicyMode {
        self.mode
    }

    /// Resolve a signal to a direction, or the reason it is skipped.
    pub fn resolve(&self, signal: &Signal) -> Resolution {
        (self.resolver)(signal, &self.thresholds)
    }
}
