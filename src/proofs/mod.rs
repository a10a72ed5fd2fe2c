//! Non-interactive proofs that guardians act in accordance to protocol at decryption time

pub mod chaum_pedersen; // prove that a partial decryption matches the guardian's key
