//! Exchange seed data
//!
//! The Exchange bucket is a static reference set. It is filled from a JSON
//! file of `{ "name": ..., "address": ... }` entries before the pipeline
//! starts and never touched by the pipeline itself.

use crate::store::{put, Exchange, Store, StoreError};
use ethers::types::Address;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("failed to read seed file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid seed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("exchange {name:?} has an empty name or zero address")]
    InvalidEntry { name: String },

    #[error("address {0:?} listed twice")]
    DuplicateAddress(Address),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Deserialize)]
struct SeedEntry {
    name: String,
    address: Address,
}

/// Parse and validate a seed document
pub fn parse_exchanges(json: &str) -> Result<Vec<Exchange>, SeedError> {
    let entries: Vec<SeedEntry> = serde_json::from_str(json)?;
    let mut seen = HashSet::new();
    let mut exchanges = Vec::with_capacity(entries.len());

    for entry in entries {
        let name = entry.name.trim().to_string();
        if name.is_empty() || entry.address.is_zero() {
            return Err(SeedError::InvalidEntry { name });
        }
        if !seen.insert(entry.address) {
            return Err(SeedError::DuplicateAddress(entry.address));
        }
        exchanges.push(Exchange::new(name, entry.address));
    }
    Ok(exchanges)
}

pub fn load_exchanges_file(path: impl AsRef<Path>) -> Result<Vec<Exchange>, SeedError> {
    let raw = std::fs::read_to_string(path)?;
    parse_exchanges(&raw)
}

/// Upsert every exchange in one transaction; returns how many were written
pub fn seed_exchanges(store: &mut Store, exchanges: &[Exchange]) -> Result<usize, SeedError> {
    store.update(|tx| {
        for exchange in exchanges {
            put(tx, exchange)?;
        }
        Ok::<_, StoreError>(())
    })?;
    log::info!("🏦 Seeded {} exchanges", exchanges.len());
    Ok(exchanges.len())
}
