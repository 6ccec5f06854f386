//! Binary encodings used by the bucket tables
//!
//! - Big integers: minimal big-endian bytes, zero is the empty string.
//! - Addresses: raw 20 bytes. Transaction hashes: raw 32 bytes.
//! - Record values: `bincode` over serde structs whose integer fields use
//!   [`uint_bytes`] so the on-disk value carries the same minimal form.

use super::{Bucket, StoreError};
use ethers::types::{Address, H256, U256};
use serde::{de::DeserializeOwned, Serialize};

/// Minimal big-endian encoding of `value` (no leading zero bytes)
pub fn encode_uint(value: &U256) -> Vec<u8> {
    let mut buf = [0u8; 32];
    value.to_big_endian(&mut buf);
    let first = buf.iter().position(|b| *b != 0).unwrap_or(buf.len());
    buf[first..].to_vec()
}

/// Rebuild an integer from big-endian bytes; absent bytes decode to zero
pub fn decode_uint(bytes: &[u8]) -> Result<U256, StoreError> {
    if bytes.len() > 32 {
        return Err(StoreError::IntegerOverflow(bytes.len()));
    }
    Ok(U256::from_big_endian(bytes))
}

pub fn decode_address(bucket: Bucket, bytes: &[u8]) -> Result<Address, StoreError> {
    if bytes.len() != Address::len_bytes() {
        return Err(StoreError::InvalidKey {
            bucket,
            reason: format!("expected 20 address bytes, got {}", bytes.len()),
        });
    }
    Ok(Address::from_slice(bytes))
}

pub fn decode_hash(bucket: Bucket, bytes: &[u8]) -> Result<H256, StoreError> {
    if bytes.len() != H256::len_bytes() {
        return Err(StoreError::InvalidKey {
            bucket,
            reason: format!("expected 32 hash bytes, got {}", bytes.len()),
        });
    }
    Ok(H256::from_slice(bytes))
}

pub fn encode_value<T: Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(bincode::serialize(value)?)
}

pub fn decode_value<T: DeserializeOwned>(raw: &[u8]) -> Result<T, StoreError> {
    Ok(bincode::deserialize(raw)?)
}

/// Serde adapter storing a `U256` as its minimal big-endian bytes
///
/// Use with `#[serde(with = "crate::store::codec::uint_bytes")]`.
pub mod uint_bytes {
    use super::{decode_uint, encode_uint};
    use ethers::types::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&encode_uint(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        decode_uint(&bytes).map_err(D::Error::custom)
    }
}

/// Serde adapter storing an address as its raw 20 bytes
pub mod address_bytes {
    use ethers::types::Address;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(value.as_bytes())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let bytes: Vec<u8> = Deserialize::deserialize(deserializer)?;
        if bytes.len() != 20 {
            return Err(D::Error::custom(format!(
                "expected 20 address bytes, got {}",
                bytes.len()
            )));
        }
        Ok(Address::from_slice(&bytes))
    }
}

/// Serde adapter for an ordered address list (swap paths)
pub mod address_list {
    use ethers::types::Address;
    use serde::{de::Error, ser::SerializeSeq, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        values: &[Address],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(values.len()))?;
        for value in values {
            seq.serialize_element(&value.0)?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Address>, D::Error> {
        let raw: Vec<[u8; 20]> = Deserialize::deserialize(deserializer)?;
        if raw.is_empty() {
            return Err(D::Error::custom("empty address list"));
        }
        Ok(raw.into_iter().map(Address::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uint_encoding_is_minimal() {
        assert!(encode_uint(&U256::zero()).is_empty());
        assert_eq!(encode_uint(&U256::from(1)), vec![0x01]);
        assert_eq!(encode_uint(&U256::from(0x0100)), vec![0x01, 0x00]);

        // 1 ETH = 0x0de0b6b3a7640000
        let one_eth = U256::exp10(18);
        assert_eq!(
            encode_uint(&one_eth),
            vec![0x0d, 0xe0, 0xb6, 0xb3, 0xa7, 0x64, 0x00, 0x00]
        );
    }

    #[test]
    fn test_absent_bytes_decode_to_zero() {
        assert_eq!(decode_uint(&[]).unwrap(), U256::zero());
        assert_eq!(decode_uint(&[0, 0, 5]).unwrap(), U256::from(5));
    }

    #[test]
    fn test_oversized_integer_rejected() {
        let err = decode_uint(&[1u8; 33]).unwrap_err();
        assert!(matches!(err, StoreError::IntegerOverflow(33)));
    }

    #[test]
    fn test_max_uint_fits() {
        let bytes = encode_uint(&U256::MAX);
        assert_eq!(bytes.len(), 32);
        assert_eq!(decode_uint(&bytes).unwrap(), U256::MAX);
    }

    #[test]
    fn test_key_length_checked() {
        assert!(decode_address(Bucket::Account, &[0u8; 19]).is_err());
        assert!(decode_hash(Bucket::Swap, &[0u8; 20]).is_err());
        assert_eq!(
            decode_address(Bucket::Account, &[0xab; 20]).unwrap(),
            Address::repeat_byte(0xab)
        );
    }
}
