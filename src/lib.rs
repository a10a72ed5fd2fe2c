//! Partial decryption shares for threshold ElGamal elections.
//!
//! Each guardian publishes a share of the decryption of every encrypted selection, backed by a
//! Chaum-Pedersen proof. Guardians that are missing at tally time are compensated for by the
//! available guardians, whose fragments are verified against recovery keys instead.
use crypto_bigint::Uint;

/// Use the same big integer type everywhere
pub const LIMBS: usize = 256 / 64; // 4 words each 64 bits, a total of 256 bits
pub type BigInt = Uint<LIMBS>;

pub type GuardianId = String;
pub type ContestId = String;
pub type SelectionId = String;

pub mod decryption_share;
pub mod elgamal;
pub mod errors;
pub mod group;
pub mod hash;
pub mod proofs;
pub mod tally;
