//! Scripted in-memory chain for unit tests

use super::chain::{
    BlockBatch, BlockHeader, ChainError, ChainReader, ChainTransaction, HeaderStream,
    PairReserves, TokenMetadata,
};
use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct MockChain {
    blocks: Mutex<HashMap<u64, BlockBatch>>,
    /// Remaining failures per block number
    failing: Mutex<HashMap<u64, u32>>,
    /// One entry per `subscribe_new_headers` call; `None` fails the call
    subscriptions: Mutex<VecDeque<Option<Vec<BlockHeader>>>>,
    pairs: Mutex<HashMap<(Address, Address), PairReserves>>,
    factories: Mutex<HashMap<Address, Address>>,
    tokens: Mutex<HashMap<Address, TokenMetadata>>,
    pub factory_calls: AtomicUsize,
    pub subscribe_calls: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_block(&self, number: u64, transactions: Vec<ChainTransaction>) -> BlockHeader {
        let batch = BlockBatch {
            number,
            hash: block_hash(number),
            transactions,
        };
        let header = batch.header();
        self.blocks.lock().unwrap().insert(number, batch);
        header
    }

    pub fn fail_block(&self, number: u64, times: u32) {
        self.failing.lock().unwrap().insert(number, times);
    }

    pub fn script_subscription(&self, headers: Vec<BlockHeader>) {
        self.subscriptions.lock().unwrap().push_back(Some(headers));
    }

    pub fn script_subscription_failure(&self) {
        self.subscriptions.lock().unwrap().push_back(None);
    }

    /// Register a pair; `reserve_a` belongs to `token_a`
    pub fn add_pair(&self, token_a: Address, token_b: Address, reserve_a: u64, reserve_b: u64) {
        let (key, reserves) = if token_a < token_b {
            ((token_a, token_b), (reserve_a, reserve_b))
        } else {
            ((token_b, token_a), (reserve_b, reserve_a))
        };
        self.pairs.lock().unwrap().insert(
            key,
            PairReserves {
                reserve0: U256::from(reserves.0),
                reserve1: U256::from(reserves.1),
            },
        );
    }

    pub fn add_router(&self, router: Address, factory: Address) {
        self.factories.lock().unwrap().insert(router, factory);
    }

    pub fn add_token(&self, token: Address, symbol: &str, decimals: u8) {
        self.tokens.lock().unwrap().insert(
            token,
            TokenMetadata {
                symbol: symbol.to_string(),
                decimals,
            },
        );
    }

    fn fetch(&self, number: u64) -> Result<BlockBatch, ChainError> {
        if let Some(remaining) = self.failing.lock().unwrap().get_mut(&number) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ChainError::Provider(format!("scripted failure for {}", number)));
            }
        }
        self.blocks
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .ok_or_else(|| ChainError::BlockNotFound(number.to_string()))
    }
}

static NEXT_TX: AtomicU64 = AtomicU64::new(1);

fn next_tx_hash() -> H256 {
    H256::from_low_u64_be(NEXT_TX.fetch_add(1, Ordering::Relaxed))
}

pub fn block_hash(number: u64) -> H256 {
    H256::from_low_u64_be(number + 0x1000)
}

pub fn transfer(from: Address, to: Address, value: U256) -> ChainTransaction {
    ChainTransaction {
        hash: next_tx_hash(),
        from,
        to: Some(to),
        value,
        input: Bytes::new(),
    }
}

pub fn call(from: Address, to: Address, value: U256, input: Vec<u8>) -> ChainTransaction {
    ChainTransaction {
        hash: next_tx_hash(),
        from,
        to: Some(to),
        value,
        input: Bytes::from(input),
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn subscribe_new_headers(&self) -> Result<HeaderStream, ChainError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        match self.subscriptions.lock().unwrap().pop_front() {
            Some(Some(headers)) => Ok(futures::stream::iter(headers).boxed()),
            Some(None) => Err(ChainError::Provider("scripted subscribe failure".into())),
            // Script exhausted: stay subscribed, silently
            None => Ok(futures::stream::pending::<BlockHeader>().boxed()),
        }
    }

    async fn block_by_hash(&self, hash: H256) -> Result<BlockBatch, ChainError> {
        let number = self
            .blocks
            .lock()
            .unwrap()
            .values()
            .find(|b| b.hash == hash)
            .map(|b| b.number)
            .ok_or_else(|| ChainError::BlockNotFound(format!("{:?}", hash)))?;
        self.fetch(number)
    }

    async fn block_by_number(&self, number: u64) -> Result<BlockBatch, ChainError> {
        self.fetch(number)
    }

    async fn reserves_for_pair(
        &self,
        _factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> Result<PairReserves, ChainError> {
        let key = if token_a < token_b {
            (token_a, token_b)
        } else {
            (token_b, token_a)
        };
        self.pairs
            .lock()
            .unwrap()
            .get(&key)
            .copied()
            .ok_or(ChainError::PairNotFound(token_a, token_b))
    }

    async fn factory_for_router(&self, router: Address) -> Result<Address, ChainError> {
        self.factory_calls.fetch_add(1, Ordering::SeqCst);
        self.factories
            .lock()
            .unwrap()
            .get(&router)
            .copied()
            .ok_or_else(|| ChainError::Contract(format!("{:?} is not a router", router)))
    }

    async fn erc20_metadata(&self, token: Address) -> Result<TokenMetadata, ChainError> {
        self.tokens
            .lock()
            .unwrap()
            .get(&token)
            .cloned()
            .ok_or_else(|| ChainError::Contract(format!("{:?} is not an ERC-20", token)))
    }
}
