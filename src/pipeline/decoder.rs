//! Router call-data decoding
//!
//! Recognises the two Uniswap-V2-style "ETH in" router methods. Both share
//! the argument layout `(uint256 amount, address[] path, address to,
//! uint256 deadline)`; only the meaning of `amount` differs.

use ethers::abi::{self, ParamType, Token as AbiToken};
use ethers::types::{Address, U256};

/// `swapExactETHForTokens(uint256,address[],address,uint256)`
pub const SWAP_EXACT_ETH_FOR_TOKENS: [u8; 4] = [0x7f, 0xf3, 0x6a, 0xb5];

/// `swapETHForExactTokens(uint256,address[],address,uint256)`
pub const SWAP_ETH_FOR_EXACT_TOKENS: [u8; 4] = [0xfb, 0x3b, 0xdb, 0x41];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapMethod {
    /// Exact ETH in, minimum tokens out
    ExactEthForTokens,
    /// ETH in, exact tokens out
    EthForExactTokens,
}

impl SwapMethod {
    pub fn from_selector(selector: [u8; 4]) -> Option<Self> {
        match selector {
            SWAP_EXACT_ETH_FOR_TOKENS => Some(Self::ExactEthForTokens),
            SWAP_ETH_FOR_EXACT_TOKENS => Some(Self::EthForExactTokens),
            _ => None,
        }
    }

    pub fn selector(self) -> [u8; 4] {
        match self {
            Self::ExactEthForTokens => SWAP_EXACT_ETH_FOR_TOKENS,
            Self::EthForExactTokens => SWAP_ETH_FOR_EXACT_TOKENS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ExactEthForTokens => "swapExactETHForTokens",
            Self::EthForExactTokens => "swapETHForExactTokens",
        }
    }
}

/// Structured view of a decoded router call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapCall {
    pub method: SwapMethod,
    /// ETH attached to the transaction
    pub amount_in: U256,
    /// `amountOutMin` or `amountOut`, depending on `method`
    pub amount_out: U256,
    pub token_in: Address,
    pub token_out: Address,
    pub path: Vec<Address>,
    pub recipient: Address,
    pub deadline: U256,
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown method selector 0x{}", hex::encode(.0))]
    UnknownMethod([u8; 4]),

    #[error("call data shorter than a selector ({0} bytes)")]
    MissingSelector(usize),

    #[error("malformed arguments: {0}")]
    Abi(#[from] abi::Error),

    #[error("swap path is empty")]
    EmptyPath,

    #[error("unexpected argument layout")]
    UnexpectedLayout,
}

/// First four bytes of call data, if present
pub fn selector(input: &[u8]) -> Option<[u8; 4]> {
    input.get(..4)?.try_into().ok()
}

/// Decode the arguments of a known swap method
///
/// `amount_in` is taken from `native_value`, not from the arguments.
pub fn decode(
    selector: [u8; 4],
    args: &[u8],
    native_value: U256,
) -> Result<SwapCall, DecodeError> {
    let method = SwapMethod::from_selector(selector).ok_or(DecodeError::UnknownMethod(selector))?;

    let tokens = abi::decode(
        &[
            ParamType::Uint(256),
            ParamType::Array(Box::new(ParamType::Address)),
            ParamType::Address,
            ParamType::Uint(256),
        ],
        args,
    )?;

    let (amount_out, raw_path, recipient, deadline) = match tokens.as_slice() {
        [AbiToken::Uint(amount), AbiToken::Array(path), AbiToken::Address(to), AbiToken::Uint(deadline)] => {
            (*amount, path, *to, *deadline)
        }
        _ => return Err(DecodeError::UnexpectedLayout),
    };

    let path = raw_path
        .iter()
        .map(|token| match token {
            AbiToken::Address(address) => Ok(*address),
            _ => Err(DecodeError::UnexpectedLayout),
        })
        .collect::<Result<Vec<Address>, _>>()?;

    let (token_in, token_out) = match (path.first(), path.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return Err(DecodeError::EmptyPath),
    };

    Ok(SwapCall {
        method,
        amount_in: native_value,
        amount_out,
        token_in,
        token_out,
        path,
        recipient,
        deadline,
    })
}

/// Decode full call data (selector + arguments)
pub fn decode_input(input: &[u8], native_value: U256) -> Result<SwapCall, DecodeError> {
    let sel = selector(input).ok_or(DecodeError::MissingSelector(input.len()))?;
    decode(sel, &input[4..], native_value)
}
