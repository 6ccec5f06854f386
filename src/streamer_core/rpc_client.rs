//! `ethers` WebSocket implementation of [`ChainReader`]

use super::chain::{
    BlockBatch, BlockHeader, ChainError, ChainReader, HeaderStream, PairReserves, TokenMetadata,
};
use async_trait::async_trait;
use ethers::providers::{Middleware, Provider, Ws};
use ethers::types::{Address, BlockId, BlockNumber, H256, U256, U64};
use futures::StreamExt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

mod bindings {
    use ethers::contract::abigen;

    abigen!(
        UniswapV2Router,
        r#"[
            function factory() external view returns (address)
        ]"#
    );

    abigen!(
        UniswapV2Factory,
        r#"[
            function getPair(address tokenA, address tokenB) external view returns (address pair)
        ]"#
    );

    abigen!(
        UniswapV2Pair,
        r#"[
            function getReserves() external view returns (uint112 reserve0, uint112 reserve1, uint32 blockTimestampLast)
        ]"#
    );

    abigen!(
        Erc20,
        r#"[
            function symbol() external view returns (string)
            function decimals() external view returns (uint8)
        ]"#
    );
}

use bindings::{Erc20, UniswapV2Factory, UniswapV2Pair, UniswapV2Router};

/// Headers buffered between the socket task and the consumer
const HEADER_BUFFER: usize = 64;

pub struct EthersChainReader {
    provider: Arc<Provider<Ws>>,
    call_timeout: Duration,
}

impl EthersChainReader {
    /// Connect over WebSocket; the transport retries dropped sockets itself
    pub async fn connect(
        url: &str,
        call_timeout: Duration,
        reconnects: usize,
    ) -> Result<Self, ChainError> {
        log::info!("🔌 Connecting to {}", mask_url(url));
        let provider = Provider::<Ws>::connect_with_reconnects(url, reconnects)
            .await
            .map_err(|e| ChainError::Provider(e.to_string()))?;
        let chain_id = provider
            .get_chainid()
            .await
            .map_err(|e| ChainError::Provider(e.to_string()))?;
        log::info!("✅ Connected (chain id {})", chain_id);

        Ok(Self {
            provider: Arc::new(provider),
            call_timeout,
        })
    }

    async fn bounded<T, F>(&self, fut: F) -> Result<T, ChainError>
    where
        F: Future<Output = Result<T, ChainError>>,
    {
        tokio::time::timeout(self.call_timeout, fut)
            .await
            .map_err(|_| ChainError::Timeout(self.call_timeout))?
    }

    async fn fetch_block(&self, id: BlockId) -> Result<BlockBatch, ChainError> {
        let block = self
            .bounded(async {
                self.provider
                    .get_block_with_txs(id)
                    .await
                    .map_err(|e| ChainError::Provider(e.to_string()))
            })
            .await?
            .ok_or_else(|| ChainError::BlockNotFound(format!("{:?}", id)))?;
        BlockBatch::from_block(block)
    }
}

#[async_trait]
impl ChainReader for EthersChainReader {
    async fn subscribe_new_headers(&self) -> Result<HeaderStream, ChainError> {
        let provider = self.provider.clone();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), ChainError>>();
        let (header_tx, header_rx) = mpsc::channel::<BlockHeader>(HEADER_BUFFER);

        // The subscription stream borrows the provider, so it lives in its
        // own task and forwards headers over a channel.
        tokio::spawn(async move {
            let mut stream = match provider.subscribe_blocks().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(ChainError::Provider(e.to_string())));
                    return;
                }
            };

            while let Some(block) = stream.next().await {
                let (number, hash) = match (block.number, block.hash) {
                    (Some(number), Some(hash)) => (number.as_u64(), hash),
                    _ => continue,
                };
                if header_tx.send(BlockHeader { number, hash }).await.is_err() {
                    break;
                }
            }
            log::debug!("Header forwarder exiting");
        });

        ready_rx
            .await
            .map_err(|_| ChainError::SubscriptionClosed)??;

        let headers = futures::stream::unfold(header_rx, |mut rx| async move {
            rx.recv().await.map(|header| (header, rx))
        });
        Ok(headers.boxed())
    }

    async fn block_by_hash(&self, hash: H256) -> Result<BlockBatch, ChainError> {
        self.fetch_block(BlockId::Hash(hash)).await
    }

    async fn block_by_number(&self, number: u64) -> Result<BlockBatch, ChainError> {
        self.fetch_block(BlockId::Number(BlockNumber::Number(U64::from(number))))
            .await
    }

    async fn reserves_for_pair(
        &self,
        factory: Address,
        token_a: Address,
        token_b: Address,
    ) -> Result<PairReserves, ChainError> {
        let factory = UniswapV2Factory::new(factory, self.provider.clone());
        let pair = self
            .bounded(async {
                factory
                    .get_pair(token_a, token_b)
                    .call()
                    .await
                    .map_err(|e| ChainError::Contract(e.to_string()))
            })
            .await?;
        if pair.is_zero() {
            return Err(ChainError::PairNotFound(token_a, token_b));
        }

        let pair = UniswapV2Pair::new(pair, self.provider.clone());
        let (reserve0, reserve1, _) = self
            .bounded(async {
                pair.get_reserves()
                    .call()
                    .await
                    .map_err(|e| ChainError::Contract(e.to_string()))
            })
            .await?;

        Ok(PairReserves {
            reserve0: U256::from(reserve0),
            reserve1: U256::from(reserve1),
        })
    }

    async fn factory_for_router(&self, router: Address) -> Result<Address, ChainError> {
        let router = UniswapV2Router::new(router, self.provider.clone());
        self.bounded(async {
            router
                .factory()
                .call()
                .await
                .map_err(|e| ChainError::Contract(e.to_string()))
        })
        .await
    }

    async fn erc20_metadata(&self, token: Address) -> Result<TokenMetadata, ChainError> {
        let erc20 = Erc20::new(token, self.provider.clone());
        let decimals = self
            .bounded(async {
                erc20
                    .decimals()
                    .call()
                    .await
                    .map_err(|e| ChainError::Contract(e.to_string()))
            })
            .await?;

        // Some tokens return bytes32 or revert on symbol(); keep the token anyway
        let symbol = match self
            .bounded(async {
                erc20
                    .symbol()
                    .call()
                    .await
                    .map_err(|e| ChainError::Contract(e.to_string()))
            })
            .await
        {
            Ok(symbol) => symbol,
            Err(e) => {
                log::debug!("symbol() failed for {:?}: {}", token, e);
                String::from("???")
            }
        };

        Ok(TokenMetadata { symbol, decimals })
    }
}

/// Hide API keys embedded in provider URLs
pub fn mask_url(url: &str) -> String {
    match url.find("://") {
        Some(scheme_end) => {
            let rest = &url[scheme_end + 3..];
            let host_end = rest.find('/').unwrap_or(rest.len());
            format!("{}://{}/•••", &url[..scheme_end], &rest[..host_end])
        }
        None => "•••".to_string(),
    }
}
