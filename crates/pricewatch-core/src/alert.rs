//! Threshold crossing detection.
//!
//! The detector is stateless: it compares the price stored before a cycle with
//! the price fetched in it. A threshold that is crossed again later fires
//! again.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::{MonitoredSymbol, ThresholdSlot, Ticker};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Crossing {
    Crossed,
    NotCrossed,
}

impl Crossing {
    pub const fn is_crossed(self) -> bool {
        matches!(self, Self::Crossed)
    }
}

/// Whether the move from `previous` to `current` crossed `threshold`.
///
/// The threshold must lie strictly on the old side and on or past the new
/// side. Without a previous sample or a threshold nothing is crossed, and a
/// symbol first observed beyond its threshold does not fire.
pub fn detect_crossing(
    previous: Option<Decimal>,
    current: Decimal,
    threshold: Option<Decimal>,
) -> Crossing {
    let (Some(previous), Some(threshold)) = (previous, threshold) else {
        return Crossing::NotCrossed;
    };

    let upward = previous < threshold && threshold <= current;
    let downward = previous > threshold && threshold >= current;
    if upward || downward {
        Crossing::Crossed
    } else {
        Crossing::NotCrossed
    }
}

/// Outbound notice for one fired threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertCrossed {
    pub symbol: Ticker,
    pub provider_id: String,
    pub display_name: Option<String>,
    pub new_price: Decimal,
    pub previous_price: Decimal,
    pub threshold: Decimal,
    pub slot: ThresholdSlot,
}

/// Evaluates both threshold slots of `symbol` against its new price. Both may
/// fire in the same cycle.
pub fn evaluate(previous: Option<Decimal>, symbol: &MonitoredSymbol) -> Vec<AlertCrossed> {
    let (Some(previous_price), Some(new_price)) = (previous, symbol.last_price) else {
        return Vec::new();
    };

    ThresholdSlot::ALL
        .into_iter()
        .filter_map(|slot| {
            let threshold = symbol.threshold(slot)?;
            detect_crossing(Some(previous_price), new_price, Some(threshold))
                .is_crossed()
                .then(|| AlertCrossed {
                    symbol: symbol.symbol.clone(),
                    provider_id: symbol.provider_id.clone(),
                    display_name: symbol.display_name.clone(),
                    new_price,
                    previous_price,
                    threshold,
                    slot,
                })
        })
        .collect()
}
