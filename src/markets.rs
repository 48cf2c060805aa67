//! Market metadata catalog.
//!
//! A JSON file mapping unified symbols ("BTC/USDT:USDT") to [`MarketSpec`],
//! written by `trendbot sync-markets` and loaded read-only at startup.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::exchange::okx::OkxInstrument;
use crate::models::{MarketLimits, MarketPrecision, MarketSpec};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("market catalog io: {0}")]
    Io(#[from] std::io::Error),
    #[error("market catalog encoding: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("symbol {0} not in market catalog; run `trendbot sync-markets` first")]
    UnknownSymbol(String),
}

pub struct MarketCatalog {
    markets: HashMap<String, MarketSpec>,
}

impl MarketCatalog {
    pub fn new(markets: HashMap<String, MarketSpec>) -> Self {
        Self { markets }
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)?;
        let markets: HashMap<String, MarketSpec> = serde_json::from_str(&raw)?;
        Ok(Self { markets })
    }

    pub fn save(&self, path: &Path) -> Result<(), CatalogError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(&self.markets)?)?;
        Ok(())
    }

    pub fn get(&self, symbol: &str) -> Result<&MarketSpec, CatalogError> {
        self.markets
            .get(symbol)
            .ok_or_else(|| CatalogError::UnknownSymbol(symbol.to_string()))
    }

    pub fn len(&self) -> usize {
        self.markets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    /// Distill raw exchange instrument rows into the catalog.
    ///
    /// Instruments that are not live or whose metadata cannot be parsed are
    /// skipped rather than imported half-formed.
    pub fn from_instruments(instruments: &[OkxInstrument]) -> Self {
        let mut markets = HashMap::new();
        for inst in instruments {
            if inst.state != "live" {
                continue;
            }
            match market_from_instrument(inst) {
                Some(spec) => {
                    markets.insert(spec.symbol.clone(), spec);
                }
                None => {
                    tracing::debug!("skipping instrument {} (unparseable metadata)", inst.inst_id);
                }
            }
        }
        Self { markets }
    }
}

fn market_from_instrument(inst: &OkxInstrument) -> Option<MarketSpec> {
    // Swap underlying is "BASE-QUOTE"; settle currency completes the symbol
    let (base, quote) = inst.uly.split_once('-')?;
    let symbol = format!("{}/{}:{}", base, quote, inst.settle_ccy);

    Some(MarketSpec {
        symbol,
        id: inst.inst_id.clone(),
        base: base.to_string(),
        quote: quote.to_string(),
        contract_size: inst.ct_val.parse().ok(),
        precision: MarketPrecision {
            price: decimals_from_step(&inst.tick_sz),
            amount: decimals_from_step(&inst.lot_sz),
        },
        limits: MarketLimits {
            min_amount: inst.min_sz.parse().ok(),
            min_cost: None,
        },
    })
}

/// Number of decimal places implied by a step string: "0.001" -> 3, "1" -> 0.
pub fn decimals_from_step(step: &str) -> Option<u32> {
    let step = step.trim();
    if step.is_empty() || step.parse::<f64>().is_err() {
        return None;
    }
    match step.split_once('.') {
        Some((_, frac)) => Some(frac.trim_end_matches('0').len() as u32),
        None => Some(0),
    }
}
