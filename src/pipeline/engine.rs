//! Batch coordinator
//!
//! Turns one block's transactions into aggregate updates. Processing runs in
//! two phases:
//!
//! 1. **Resolve** (async): classify every transaction, decode swap calls and
//!    fetch factory, token metadata and reserves over RPC. Store reads happen
//!    under short sync locks; nothing is written.
//! 2. **Apply** (sync): every Account/Token/Pattern/Swap mutation of the
//!    batch, plus the block cursor, inside one write transaction. Any store
//!    error rolls the whole batch back.
//!
//! Per-transaction failures during resolve (bad call data, missing pair,
//! RPC error) skip that transaction only.

use super::classifier::{classify, Classification, ExchangeSet, IgnoreReason};
use super::decoder::{self, DecodeError, SwapCall};
use super::price::{path_price, FeeMultiplier, PriceError};
use crate::store::{
    has, peek, put, Account, BlockCursor, Pattern, PatternKey, Store, StoreError, Swap, Token,
};
use crate::streamer_core::chain::{BlockBatch, ChainError, ChainReader, TokenMetadata};
use ethers::types::{Address, H256, U256};
use rusqlite::{Connection, Transaction};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// Tunables of the coordinator
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Transfers and swaps below this value (wei) are ignored
    pub min_transfer_wei: U256,
    /// Optional fee applied to live swap prices
    pub fee: Option<FeeMultiplier>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            min_transfer_wei: U256::exp10(18),
            fee: None,
        }
    }
}

/// Why a transaction was dropped after classification
#[derive(Debug, thiserror::Error)]
pub enum SkipReason {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("pricing failed: {0}")]
    Price(#[from] PriceError),

    #[error("chain lookup failed: {0}")]
    Chain(#[from] ChainError),

    #[error("swap already recorded")]
    AlreadyRecorded,
}

#[derive(Debug)]
pub enum TxOutcome {
    Transfer,
    Swap,
    Skipped(SkipReason),
    Ignored(IgnoreReason),
}

/// Counters of one processed batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub block: u64,
    pub transactions: usize,
    pub transfers: usize,
    pub swaps: usize,
    pub skipped: usize,
    pub ignored: usize,
}

impl BatchSummary {
    fn count(&mut self, outcome: &TxOutcome) {
        match outcome {
            TxOutcome::Transfer => self.transfers += 1,
            TxOutcome::Swap => self.swaps += 1,
            TxOutcome::Skipped(_) => self.skipped += 1,
            TxOutcome::Ignored(_) => self.ignored += 1,
        }
    }
}

enum ResolveError {
    Skip(SkipReason),
    Store(StoreError),
}

impl From<StoreError> for ResolveError {
    fn from(e: StoreError) -> Self {
        ResolveError::Store(e)
    }
}

macro_rules! skip_from {
    ($($err:ty),*) => {
        $(impl From<$err> for ResolveError {
            fn from(e: $err) -> Self {
                ResolveError::Skip(e.into())
            }
        })*
    };
}

skip_from!(DecodeError, PriceError, ChainError);

/// A swap with everything fetched from the chain
struct ResolvedSwap {
    tx_hash: H256,
    wallet: Address,
    factory: Address,
    call: SwapCall,
    /// Metadata of every token on the path
    tokens: Vec<(Address, TokenMetadata)>,
    price: U256,
}

enum Planned {
    Transfer {
        exchange: String,
        recipient: Address,
        value: U256,
    },
    Swap(ResolvedSwap),
}

pub struct Coordinator<C: ChainReader + ?Sized> {
    store: Arc<Mutex<Store>>,
    chain: Arc<C>,
    exchanges: Arc<ExchangeSet>,
    settings: EngineSettings,
    /// Serialises batches even if two callers race
    batch_lock: tokio::sync::Mutex<()>,
    /// router -> factory; routers never change their factory
    factories: tokio::sync::Mutex<HashMap<Address, Address>>,
}

impl<C: ChainReader + ?Sized> Coordinator<C> {
    pub fn new(
        store: Arc<Mutex<Store>>,
        chain: Arc<C>,
        exchanges: Arc<ExchangeSet>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            chain,
            exchanges,
            settings,
            batch_lock: tokio::sync::Mutex::new(()),
            factories: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<Mutex<Store>> {
        &self.store
    }

    /// Cursor of the last committed batch
    pub fn last_processed(&self) -> Result<Option<BlockCursor>, StoreError> {
        self.with_store(|store| BlockCursor::load(store.connection()))
    }

    fn with_store<T>(
        &self,
        f: impl FnOnce(&mut Store) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.store.lock().map_err(|_| StoreError::Poisoned)?;
        f(&mut guard)
    }

    /// Process one block: resolve every transaction, then commit once
    ///
    /// A `StoreError` means nothing from this batch was written.
    pub async fn process_batch(&self, batch: &BlockBatch) -> Result<BatchSummary, StoreError> {
        let _guard = self.batch_lock.lock().await;

        let mut summary = BatchSummary {
            block: batch.number,
            transactions: batch.transactions.len(),
            ..Default::default()
        };

        let (plans, outcomes) = self.resolve(batch).await?;
        for outcome in &outcomes {
            summary.count(outcome);
        }

        let applied = self.with_store(|store| {
            store.update(|tx| {
                let mut applied = Vec::with_capacity(plans.len());
                for plan in &plans {
                    applied.push(apply_plan(tx, plan)?);
                }
                put(tx, &BlockCursor::new(batch.number, batch.hash))?;
                Ok::<_, StoreError>(applied)
            })
        })?;
        for outcome in &applied {
            summary.count(outcome);
        }

        Ok(summary)
    }

    async fn resolve(
        &self,
        batch: &BlockBatch,
    ) -> Result<(Vec<Planned>, Vec<TxOutcome>), StoreError> {
        let mut plans = Vec::new();
        let mut outcomes = Vec::new();
        // Wallets credited earlier in this batch count as tracked
        let mut funded: HashSet<Address> = HashSet::new();
        let mut token_cache: HashMap<Address, TokenMetadata> = HashMap::new();

        for tx in &batch.transactions {
            let class = self.with_store(|store| {
                classify(tx, &self.exchanges, self.settings.min_transfer_wei, |addr| {
                    if funded.contains(addr) {
                        return Ok(true);
                    }
                    has::<Account>(store.connection(), addr)
                })
            })?;

            match class {
                Classification::CexTransfer {
                    exchange,
                    recipient,
                    value,
                } => {
                    log::debug!("💸 {} -> {:?}: {} wei", exchange, recipient, value);
                    funded.insert(recipient);
                    plans.push(Planned::Transfer {
                        exchange: exchange.to_string(),
                        recipient,
                        value,
                    });
                }
                Classification::SwapCandidate { wallet, router, .. } => {
                    match self
                        .resolve_swap(tx.hash, wallet, router, &tx.input, tx.value, &mut token_cache)
                        .await
                    {
                        Ok(swap) => plans.push(Planned::Swap(swap)),
                        Err(ResolveError::Skip(reason)) => {
                            log::warn!("⚠️  Skipping swap {:?}: {}", tx.hash, reason);
                            outcomes.push(TxOutcome::Skipped(reason));
                        }
                        Err(ResolveError::Store(e)) => return Err(e),
                    }
                }
                Classification::Ignored(reason) => outcomes.push(TxOutcome::Ignored(reason)),
            }
        }

        Ok((plans, outcomes))
    }

    async fn resolve_swap(
        &self,
        tx_hash: H256,
        wallet: Address,
        router: Address,
        input: &[u8],
        value: U256,
        token_cache: &mut HashMap<Address, TokenMetadata>,
    ) -> Result<ResolvedSwap, ResolveError> {
        let call = decoder::decode_input(input, value)?;
        let factory = self.factory_for(router).await?;

        let mut tokens = Vec::with_capacity(call.path.len());
        for token in &call.path {
            let meta = self.token_metadata(*token, token_cache).await?;
            tokens.push((*token, meta));
        }
        let out_decimals = tokens
            .last()
            .map(|(_, meta)| meta.decimals)
            .ok_or(DecodeError::EmptyPath)?;

        let price = path_price(
            self.chain.as_ref(),
            factory,
            &call.path,
            out_decimals,
            self.settings.fee,
        )
        .await?;

        Ok(ResolvedSwap {
            tx_hash,
            wallet,
            factory,
            call,
            tokens,
            price,
        })
    }

    async fn factory_for(&self, router: Address) -> Result<Address, ChainError> {
        let mut cache = self.factories.lock().await;
        if let Some(factory) = cache.get(&router) {
            return Ok(*factory);
        }
        let factory = self.chain.factory_for_router(router).await?;
        log::debug!("🏭 Router {:?} uses factory {:?}", router, factory);
        cache.insert(router, factory);
        Ok(factory)
    }

    async fn token_metadata(
        &self,
        token: Address,
        cache: &mut HashMap<Address, TokenMetadata>,
    ) -> Result<TokenMetadata, ResolveError> {
        if let Some(meta) = cache.get(&token) {
            return Ok(meta.clone());
        }

        let stored = self.with_store(|store| stored_metadata(store.connection(), token))?;
        let meta = match stored {
            Some(meta) => meta,
            None => self.chain.erc20_metadata(token).await?,
        };
        cache.insert(token, meta.clone());
        Ok(meta)
    }
}

fn stored_metadata(conn: &Connection, token: Address) -> Result<Option<TokenMetadata>, StoreError> {
    match peek::<Token>(conn, &token) {
        Ok(t) => Ok(Some(TokenMetadata {
            symbol: t.symbol,
            decimals: t.decimals,
        })),
        Err(StoreError::NotFound { .. }) => Ok(None),
        Err(e) => Err(e),
    }
}

fn peek_account(tx: &Transaction<'_>, address: Address) -> Result<Account, StoreError> {
    match peek::<Account>(tx, &address) {
        Err(StoreError::NotFound { .. }) => Ok(Account::new(address)),
        other => other,
    }
}

fn apply_plan(tx: &Transaction<'_>, plan: &Planned) -> Result<TxOutcome, StoreError> {
    match plan {
        Planned::Transfer {
            exchange,
            recipient,
            value,
        } => {
            let mut account = peek_account(tx, *recipient)?;
            account.record_transfer(exchange, *value);
            put(tx, &account)?;
            Ok(TxOutcome::Transfer)
        }
        Planned::Swap(swap) => apply_swap(tx, swap),
    }
}

fn apply_swap(tx: &Transaction<'_>, swap: &ResolvedSwap) -> Result<TxOutcome, StoreError> {
    if has::<Swap>(tx, &swap.tx_hash)? {
        log::debug!("⏭️  Swap {:?} already recorded", swap.tx_hash);
        return Ok(TxOutcome::Skipped(SkipReason::AlreadyRecorded));
    }

    let value = swap.call.amount_in;
    let token_out = swap.call.token_out;

    let mut account = peek_account(tx, swap.wallet)?;
    account.record_spend(value);

    for (address, meta) in &swap.tokens {
        let mut token = match peek::<Token>(tx, address) {
            Ok(token) => token,
            Err(StoreError::NotFound { .. }) => Token::new(*address, meta.symbol.clone(), meta.decimals),
            Err(e) => return Err(e),
        };
        if *address == token_out && token.record_purchase(swap.price, value) {
            log::info!("🏷️  First price for {} ({:?}): {}", token.symbol, address, swap.price);
        }
        put(tx, &token)?;
    }

    for exchange in &account.from_exchanges {
        let key = PatternKey::new(token_out, exchange.clone());
        let mut pattern = match peek::<Pattern>(tx, &key) {
            Ok(pattern) => pattern,
            Err(StoreError::NotFound { .. }) => Pattern::new(token_out, exchange.clone()),
            Err(e) => return Err(e),
        };
        pattern.record(value);
        put(tx, &pattern)?;
    }

    put(
        tx,
        &Swap {
            tx_hash: swap.tx_hash,
            wallet: swap.wallet,
            token: token_out,
            path: swap.call.path.clone(),
            factory: swap.factory,
            price: swap.price,
            value,
        },
    )?;
    put(tx, &account)?;

    log::info!(
        "🔄 {:?} swapped {} wei into {:?} via {}",
        swap.wallet,
        value,
        token_out,
        swap.call.method.name()
    );
    Ok(TxOutcome::Swap)
}
