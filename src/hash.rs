//! Fiat-Shamir hashing of big integers into Z_q
use crate::{
    group::{ElementModQ, Group},
    BigInt,
};
use crypto_bigint::Encoding;
use digest::Digest;
use sha3::Sha3_256;

/// Hash a sequence of integers into an exponent (mod q). Every integer is absorbed as its
/// fixed-width big-endian encoding, so the sequence boundaries are unambiguous.
pub fn hash_elems(group: &Group, elems: &[&BigInt]) -> ElementModQ {
    let mut hasher = Sha3_256::new();
    for elem in elems {
        hasher.update(elem.to_be_bytes());
    }
    let hash: Vec<u8> = hasher.finalize().to_vec();
    return group.reduce_q(&BigInt::from_be_slice(&hash));
}
