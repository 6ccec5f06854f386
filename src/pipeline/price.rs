//! Constant-product path pricing
//!
//! Prices are walked hop by hop along a swap path: starting from an amount of
//! the last token, each hop scales by `reserve_in / reserve_out`, giving the
//! equivalent amount of the path's first asset.

use crate::store::Token;
use crate::streamer_core::chain::{ChainError, ChainReader, PairReserves};
use ethers::types::{Address, U256, U512};

/// Basis-point denominator for [`FeeMultiplier`]
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Reserves of one hop, already oriented along the path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reserves {
    pub reserve_in: U256,
    pub reserve_out: U256,
}

impl Reserves {
    pub fn new(reserve_in: impl Into<U256>, reserve_out: impl Into<U256>) -> Self {
        Self {
            reserve_in: reserve_in.into(),
            reserve_out: reserve_out.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PriceError {
    #[error("hop {hop} has an empty output reserve")]
    ZeroReserve { hop: usize },

    #[error("price does not fit in 256 bits")]
    Overflow,

    #[error("{0} decimals is out of range")]
    DecimalsOutOfRange(u8),

    #[error("path needs at least two tokens, got {0}")]
    EmptyPath(usize),

    #[error("identical addresses in hop {0:?}")]
    IdenticalAddresses(Address),

    #[error("zero address in swap path")]
    ZeroAddress,

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Fee applied on top of a computed price, in basis points (9700 = 0.97)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeMultiplier {
    pub bps: u32,
}

impl FeeMultiplier {
    pub fn from_bps(bps: u32) -> Self {
        Self { bps }
    }

    pub fn apply(self, value: U256) -> Result<U256, PriceError> {
        let scaled = value.full_mul(U256::from(self.bps)) / U512::from(BPS_DENOMINATOR);
        U256::try_from(scaled).map_err(|_| PriceError::Overflow)
    }
}

/// `output * Π(reserve_in / reserve_out)`, truncating after every hop
pub fn price(output: U256, reserves: &[Reserves]) -> Result<U256, PriceError> {
    let mut value = output;
    for (hop, r) in reserves.iter().enumerate() {
        if r.reserve_out.is_zero() {
            return Err(PriceError::ZeroReserve { hop });
        }
        let scaled = value.full_mul(r.reserve_in) / U512::from(r.reserve_out);
        value = U256::try_from(scaled).map_err(|_| PriceError::Overflow)?;
    }
    Ok(value)
}

/// Orient a pair's raw reserves so `reserve_in` belongs to `token_a`
///
/// Pairs store reserves sorted by numeric address; when `token_a` is the
/// larger address its reserve is `reserve1`.
pub fn orient_reserves(
    token_a: Address,
    token_b: Address,
    raw: PairReserves,
) -> Result<Reserves, PriceError> {
    if token_a.is_zero() || token_b.is_zero() {
        return Err(PriceError::ZeroAddress);
    }
    let a = U256::from_big_endian(token_a.as_bytes());
    let b = U256::from_big_endian(token_b.as_bytes());
    if a == b {
        return Err(PriceError::IdenticalAddresses(token_a));
    }

    Ok(if a < b {
        Reserves {
            reserve_in: raw.reserve0,
            reserve_out: raw.reserve1,
        }
    } else {
        Reserves {
            reserve_in: raw.reserve1,
            reserve_out: raw.reserve0,
        }
    })
}

/// Fetch oriented reserves for every hop of `path`
pub async fn reserves_along_path<C>(
    chain: &C,
    factory: Address,
    path: &[Address],
) -> Result<Vec<Reserves>, PriceError>
where
    C: ChainReader + ?Sized,
{
    if path.len() < 2 {
        return Err(PriceError::EmptyPath(path.len()));
    }

    let mut reserves = Vec::with_capacity(path.len() - 1);
    for hop in path.windows(2) {
        let (token_a, token_b) = (hop[0], hop[1]);
        let raw = chain.reserves_for_pair(factory, token_a, token_b).await?;
        reserves.push(orient_reserves(token_a, token_b, raw)?);
    }
    Ok(reserves)
}

/// Current price of one whole unit of the last token of `path`
///
/// `decimals` are the last token's decimals. The fee is applied only when
/// given.
pub async fn path_price<C>(
    chain: &C,
    factory: Address,
    path: &[Address],
    decimals: u8,
    fee: Option<FeeMultiplier>,
) -> Result<U256, PriceError>
where
    C: ChainReader + ?Sized,
{
    let unit = Token::unit(decimals).ok_or(PriceError::DecimalsOutOfRange(decimals))?;
    let reserves = reserves_along_path(chain, factory, path).await?;
    let value = price(unit, &reserves)?;
    match fee {
        Some(fee) => fee.apply(value),
        None => Ok(value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::streamer_core::mock_chain::MockChain;

    #[test]
    fn test_single_hop_price() {
        let p = price(U256::from(10), &[Reserves::new(100u64, 200u64)]).unwrap();
        assert_eq!(p, U256::from(5));
    }

    #[test]
    fn test_truncates_after_each_hop() {
        // 10 * 1 / 3 = 3, then 3 * 5 / 2 = 7 (not 10 * 5 / 6 = 8)
        let p = price(
            U256::from(10),
            &[Reserves::new(1u64, 3u64), Reserves::new(5u64, 2u64)],
        )
        .unwrap();
        assert_eq!(p, U256::from(7));
    }

    #[test]
    fn test_no_hops_is_identity() {
        assert_eq!(price(U256::from(42), &[]).unwrap(), U256::from(42));
    }

    #[test]
    fn test_zero_reserve_rejected() {
        let err = price(
            U256::from(10),
            &[Reserves::new(1u64, 1u64), Reserves::new(1u64, 0u64)],
        )
        .unwrap_err();
        assert!(matches!(err, PriceError::ZeroReserve { hop: 1 }));
    }

    #[test]
    fn test_intermediate_product_may_exceed_256_bits() {
        let p = price(U256::MAX, &[Reserves::new(U256::MAX, U256::MAX)]).unwrap();
        assert_eq!(p, U256::MAX);

        let err = price(U256::MAX, &[Reserves::new(2u64, 1u64)]).unwrap_err();
        assert!(matches!(err, PriceError::Overflow));
    }

    #[test]
    fn test_orientation_by_numeric_address() {
        let low = Address::from_low_u64_be(1);
        let high = Address::from_low_u64_be(2);
        let raw = PairReserves {
            reserve0: U256::from(10),
            reserve1: U256::from(20),
        };

        let forward = orient_reserves(low, high, raw).unwrap();
        assert_eq!(forward, Reserves::new(10u64, 20u64));

        let reverse = orient_reserves(high, low, raw).unwrap();
        assert_eq!(reverse, Reserves::new(20u64, 10u64));

        assert!(matches!(
            orient_reserves(low, low, raw),
            Err(PriceError::IdenticalAddresses(_))
        ));
        assert!(matches!(
            orient_reserves(Address::zero(), low, raw),
            Err(PriceError::ZeroAddress)
        ));
    }

    #[test]
    fn test_fee_multiplier() {
        let fee = FeeMultiplier::from_bps(9_700);
        assert_eq!(fee.apply(U256::from(1_000)).unwrap(), U256::from(970));
        assert_eq!(fee.apply(U256::from(1)).unwrap(), U256::zero());
    }

    #[tokio::test]
    async fn test_path_price_over_two_hops() {
        let chain = MockChain::new();
        let weth = Address::from_low_u64_be(0xeee);
        let usdc = Address::from_low_u64_be(0xaaa);
        let token = Address::from_low_u64_be(0x111);
        let factory = Address::from_low_u64_be(0xf);

        // 1 WETH : 4000 USDC, 1 USDC : 2 TOKEN
        chain.add_pair(weth, usdc, 1_000, 4_000_000);
        chain.add_pair(usdc, token, 1_000_000, 2_000_000);

        let path = [weth, usdc, token];
        let p = path_price(&chain, factory, &path, 6, None).await.unwrap();
        // 10^6 * 1000 / 4_000_000 = 250, then 250 * 10^6 / 2*10^6 = 125
        assert_eq!(p, U256::from(125));

        let with_fee = path_price(&chain, factory, &path, 6, Some(FeeMultiplier::from_bps(9_700)))
            .await
            .unwrap();
        assert_eq!(with_fee, U256::from(121));
    }

    #[tokio::test]
    async fn test_missing_pair_surfaces_chain_error() {
        let chain = MockChain::new();
        let path = [Address::from_low_u64_be(1), Address::from_low_u64_be(2)];
        let err = path_price(&chain, Address::zero(), &path, 18, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PriceError::Chain(ChainError::PairNotFound(..))));
    }

    #[tokio::test]
    async fn test_oversized_decimals_rejected() {
        let chain = MockChain::new();
        let (a, b) = (Address::from_low_u64_be(1), Address::from_low_u64_be(2));
        chain.add_pair(a, b, 1_000, 1_000);

        let err = path_price(&chain, Address::zero(), &[a, b], 255, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PriceError::DecimalsOutOfRange(255)));
        assert!(path_price(&chain, Address::zero(), &[a, b], 77, None).await.is_ok());
    }
}
