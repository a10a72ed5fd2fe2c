//! Chaum-Pedersen proof that a partial decryption M = A ** s was computed with the same secret
//! exponent s as the public key K = g ** s, adapted to be offline using Fiat-Shamir.
//! statement: log_g(K) = log_A(M)
//! commit: (a, b) = (g ** u, A ** u)
//! challenge: c = H(Q, A, B, a, b, M)
//! response: v = u + cs (mod q)
//! verify: g ** v = a(K ** c) and A ** v = b(M ** c)
use crate::{
    elgamal::ElGamalCiphertext,
    group::{ElementModP, ElementModQ, Group},
    hash::hash_elems,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub struct ChaumPedersenProof {
    /// The commitment a = g ** u
    pad: ElementModP,

    /// The commitment b = A ** u
    data: ElementModP,

    challenge: ElementModQ,

    response: ElementModQ,
}

impl ChaumPedersenProof {
    pub fn new(
        pad: ElementModP,
        data: ElementModP,
        challenge: ElementModQ,
        response: ElementModQ,
    ) -> Self {
        return Self {
            pad,
            data,
            challenge,
            response,
        };
    }

    /// Produce a proof that `share` is the partial decryption of `ciphertext` under `secret`.
    /// The prover must hold the secret exponent; for compensation fragments that exponent is
    /// the available guardian's backup of the missing guardian's secret.
    pub fn make<R: CryptoRng + RngCore>(
        group: &Group,
        ciphertext: &ElGamalCiphertext,
        secret: &ElementModQ,
        share: &ElementModP,
        rng: &mut R,
        extended_base_hash: &ElementModQ,
    ) -> Self {
        let u = group.rand_q(rng);
        let pad = group.g_pow_p(&u);
        let data = group.pow_p(ciphertext.get_pad(), &u);
        let challenge =
            Self::generate_challenge(group, ciphertext, &pad, &data, share, extended_base_hash);
        let response = group.add_q(&u, &group.mult_q(&challenge, secret));
        return Self::new(pad, data, challenge, response);
    }

    /// Hash the statement and the commitment into the challenge
    fn generate_challenge(
        group: &Group,
        ciphertext: &ElGamalCiphertext,
        pad: &ElementModP,
        data: &ElementModP,
        share: &ElementModP,
        extended_base_hash: &ElementModQ,
    ) -> ElementModQ {
        return hash_elems(
            group,
            &[
                extended_base_hash.as_bigint(),
                ciphertext.get_pad().as_bigint(),
                ciphertext.get_data().as_bigint(),
                pad.as_bigint(),
                data.as_bigint(),
                share.as_bigint(),
            ],
        );
    }

    pub fn get_pad(&self) -> &ElementModP {
        &self.pad
    }

    pub fn get_data(&self) -> &ElementModP {
        &self.data
    }

    pub fn get_challenge(&self) -> &ElementModQ {
        &self.challenge
    }

    pub fn get_response(&self) -> &ElementModQ {
        &self.response
    }

    /// Return true iff the proof shows that `share` is the partial decryption of `ciphertext`
    /// under the secret behind `key`. `key` is either a guardian's public key or, for a
    /// compensation fragment, the recovery key of the missing guardian.
    pub fn is_valid(
        &self,
        group: &Group,
        ciphertext: &ElGamalCiphertext,
        key: &ElementModP,
        share: &ElementModP,
        extended_base_hash: &ElementModQ,
    ) -> bool {
        let in_group = [ciphertext.get_pad(), key, share, &self.pad, &self.data]
            .iter()
            .all(|elem| group.is_valid_residue(elem));
        let in_bounds =
            group.is_in_bounds_q(&self.challenge) && group.is_in_bounds_q(&self.response);
        if !in_group || !in_bounds {
            debug!(in_group, in_bounds, "Chaum-Pedersen proof has out of range values");
            return false;
        }

        let challenge = Self::generate_challenge(
            group,
            ciphertext,
            &self.pad,
            &self.data,
            share,
            extended_base_hash,
        );
        if challenge != self.challenge {
            debug!("Chaum-Pedersen proof challenge does not match the transcript");
            return false;
        }

        // g ** v = a * (K ** c)
        let consistent_key = group.g_pow_p(&self.response)
            == group.mult_p(&self.pad, &group.pow_p(key, &self.challenge));
        // A ** v = b * (M ** c)
        let consistent_share = group.pow_p(ciphertext.get_pad(), &self.response)
            == group.mult_p(&self.data, &group.pow_p(share, &self.challenge));
        if !consistent_key || !consistent_share {
            debug!(consistent_key, consistent_share, "Chaum-Pedersen proof failed to verify");
            return false;
        }
        return true;
    }
}
