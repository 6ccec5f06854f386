//! Per-transaction classification
//!
//! Decides whether a transaction is a CEX withdrawal to a wallet, a swap
//! attempt by an already tracked wallet, or noise.

use super::decoder::{self, SwapMethod};
use crate::store::{all, Exchange, StoreError};
use crate::streamer_core::chain::ChainTransaction;
use ethers::types::{Address, U256};
use rusqlite::Connection;
use std::collections::HashMap;

/// Immutable snapshot of the Exchange bucket, built once at startup
#[derive(Debug, Clone, Default)]
pub struct ExchangeSet {
    by_address: HashMap<Address, String>,
}

impl ExchangeSet {
    pub fn new(exchanges: impl IntoIterator<Item = Exchange>) -> Self {
        Self {
            by_address: exchanges
                .into_iter()
                .map(|ex| (ex.address, ex.name))
                .collect(),
        }
    }

    pub fn load(conn: &Connection) -> Result<Self, StoreError> {
        Ok(Self::new(all::<Exchange>(conn)?))
    }

    /// Exchange name owning `address`
    pub fn get(&self, address: &Address) -> Option<&str> {
        self.by_address.get(address).map(String::as_str)
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.by_address.contains_key(address)
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification<'a> {
    /// Withdrawal from `exchange` to `recipient`
    CexTransfer {
        exchange: &'a str,
        recipient: Address,
        value: U256,
    },
    /// Tracked wallet calling a known swap method on `router`
    SwapCandidate {
        wallet: Address,
        router: Address,
        method: SwapMethod,
    },
    Ignored(IgnoreReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    ContractCreation,
    BelowThreshold,
    ExchangeRecipient,
    UntrackedSender,
    ShortCallData,
    UnknownSelector,
}

/// Classify one transaction
///
/// `is_tracked` answers whether the sender is a known Account; it is only
/// consulted for senders that are not exchanges and that carry a known
/// swap selector.
pub fn classify<'a, F, E>(
    tx: &ChainTransaction,
    exchanges: &'a ExchangeSet,
    min_value: U256,
    mut is_tracked: F,
) -> Result<Classification<'a>, E>
where
    F: FnMut(&Address) -> Result<bool, E>,
{
    let recipient = match tx.to {
        Some(to) => to,
        None => return Ok(Classification::Ignored(IgnoreReason::ContractCreation)),
    };
    if tx.value < min_value {
        return Ok(Classification::Ignored(IgnoreReason::BelowThreshold));
    }

    // Exchange-to-exchange and deposits carry no signal
    if exchanges.contains(&recipient) {
        return Ok(Classification::Ignored(IgnoreReason::ExchangeRecipient));
    }

    if let Some(exchange) = exchanges.get(&tx.from) {
        return Ok(Classification::CexTransfer {
            exchange,
            recipient,
            value: tx.value,
        });
    }

    let selector = match decoder::selector(&tx.input) {
        Some(selector) => selector,
        None => return Ok(Classification::Ignored(IgnoreReason::ShortCallData)),
    };
    let method = match SwapMethod::from_selector(selector) {
        Some(method) => method,
        None => return Ok(Classification::Ignored(IgnoreReason::UnknownSelector)),
    };

    if !is_tracked(&tx.from)? {
        return Ok(Classification::Ignored(IgnoreReason::UntrackedSender));
    }

    Ok(Classification::SwapCandidate {
        wallet: tx.from,
        router: recipient,
        method,
    })
}
