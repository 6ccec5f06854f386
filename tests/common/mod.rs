//! Scripted chain shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use cexflow::streamer_core::{
    BlockBatch, BlockHeader, ChainError, ChainReader, ChainTransaction, HeaderStream,
    PairReserves, TokenMetadata,
};
use ethers::abi::{encode, Token as AbiToken};
use ethers::types::{Address, Bytes, H256, U256};
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

pub const SWAP_EXACT_ETH_FOR_TOKENS: [u8; 4] = [0x7f, 0xf3, 0x6a, 0xb5];

pub fn exchange() -> Address {
    Address::repeat_byte(0xb1)
}

pub fn wallet() -> Address {
    Address::repeat_byte(0x01)
}

pub fn router() -> Address {
    Address::repeat_byte(0x7a)
}

pub fn factory() -> Address {
    Address::repeat_byte(0x5c)
}

pub fn weth() -> Address {
    Address::from_low_u64_be(0xeeee)
}

pub fn token() -> Address {
    Address::from_low_u64_be(0x1111)
}

pub fn eth(n: u64) -> U256 {
    U256::from(n) * U256::exp10(18)
}

pub fn block_hash(number: u64) -> H256 {
    H256::from_low_u64_be(number + 0x1000)
}

static NEXT_TX: AtomicU64 = AtomicU64::new(1);

pub fn tx(from: Address, to: Address, value: U256, input: Vec<u8>) -> ChainTransaction {
    ChainTransaction {
        hash: H256::from_low_u64_be(NEXT_TX.fetch_add(1, Ordering::Relaxed)),
        from,
        to: Some(to),
        value,
        input: Bytes::from(input),
    }
}

/// swapExactETHForTokens(1, path, wallet, deadline)
pub fn swap_input(path: &[Address]) -> Vec<u8> {
    let mut input = SWAP_EXACT_ETH_FOR_TOKENS.to_vec();
    input.extend(encode(&[
        AbiToken::Uint(U256::one()),
        AbiToken::Array(path.iter().map(|a| AbiToken::Address(*a)).collect()),
        AbiToken::Address(wallet()),
        AbiToken::Uint(U256::from(u32::MAX)),
    ]));
    input
}

#[derive(Default)]
pub struct FixtureChain {
    blocks: Mutex<HashMap<u64, BlockBatch>>,
    subscriptions: Mutex<VecDeque<Vec<BlockHeader>>>,
    pub subscribe_calls: AtomicUsize,
}

impl FixtureChain {
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

    pub fn script_subscription(&self, headers: Vec<BlockHeader>) {
        self.subscriptions.lock().unwrap().push_back(headers);
    }

    pub async fn wait_for_subscriptions(&self, calls: usize) {
        while self.subscribe_calls.load(Ordering::SeqCst) < calls {
            tokio::task::yield_now().await;
        }
    }

    fn block(&self, number: u64) -> Result<BlockBatch, ChainError> {
        self.blocks
            .lock()
            .unwrap()
            .get(&number)
            .cloned()
            .ok_or_else(|| ChainError::BlockNotFound(number.to_string()))
    }
}

#[async_trait]
impl ChainReader for FixtureChain {
    async fn subscribe_new_headers(&self) -> Result<HeaderStream, ChainError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        match self.subscriptions.lock().unwrap().pop_front() {
            Some(headers) => Ok(futures::stream::iter(headers).boxed()),
            None => Ok(futures::stream::pending::<BlockHeader>().boxed()),
        }
    }

    async fn block_by_hash(&self, hash: H256) -> Result<BlockBatch, ChainError> {
        let blocks = self.blocks.lock().unwrap();
        blocks
            .values()
            .find(|b| b.hash == hash)
            .cloned()
            .ok_or_else(|| ChainError::BlockNotFound(format!("{:?}", hash)))
    }

    async fn block_by_number(&self, number: u64) -> Result<BlockBatch, ChainError> {
        self.block(number)
    }

    /// One WETH/TOKEN pair: 1 TOKEN = 0.01 WETH
    async fn reserves_for_pair(
        &self,
        factory_address: Address,
        token_a: Address,
        token_b: Address,
    ) -> Result<PairReserves, ChainError> {
        let known = [weth(), token()];
        if factory_address != factory() || !known.contains(&token_a) || !known.contains(&token_b) {
            return Err(ChainError::PairNotFound(token_a, token_b));
        }
        let (weth_reserve, token_reserve) = (U256::from(1_000u64), U256::from(100_000u64));
        Ok(if weth() < token() {
            PairReserves {
                reserve0: weth_reserve,
                reserve1: token_reserve,
            }
        } else {
            PairReserves {
                reserve0: token_reserve,
                reserve1: weth_reserve,
            }
        })
    }

    async fn factory_for_router(&self, router_address: Address) -> Result<Address, ChainError> {
        if router_address == router() {
            Ok(factory())
        } else {
            Err(ChainError::Contract(format!("not a router: {:?}", router_address)))
        }
    }

    async fn erc20_metadata(&self, address: Address) -> Result<TokenMetadata, ChainError> {
        let symbol = if address == weth() { "WETH" } else { "PEPE" };
        Ok(TokenMetadata {
            symbol: symbol.to_string(),
            decimals: 18,
        })
    }
}
