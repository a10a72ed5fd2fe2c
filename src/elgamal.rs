//! ElGamal key pairs and ciphertexts over the order-q subgroup
use crate::group::{ElementModP, ElementModQ, Group};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// A guardian's (or the joint election) public key K = g ** s
#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub struct ElGamalPublicKey(ElementModP);

impl ElGamalPublicKey {
    /// Instantiate an instance with no check
    pub fn new(key: ElementModP) -> Self {
        return Self(key);
    }

    pub fn get_key(&self) -> &ElementModP {
        &self.0
    }
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct ElGamalSecretKey(ElementModQ);

impl ElGamalSecretKey {
    pub fn new(secret: ElementModQ) -> Self {
        return Self(secret);
    }

    pub fn get_secret(&self) -> &ElementModQ {
        &self.0
    }
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct ElGamalKeyPair {
    sk: ElGamalSecretKey,
    pk: ElGamalPublicKey,
}

impl ElGamalKeyPair {
    /// Derive the public key from the secret exponent
    pub fn from_secret(group: &Group, secret: ElementModQ) -> Self {
        let pk = ElGamalPublicKey::new(group.g_pow_p(&secret));
        return Self {
            sk: ElGamalSecretKey::new(secret),
            pk,
        };
    }

    pub fn keygen<R: CryptoRng + RngCore>(group: &Group, rng: &mut R) -> Self {
        return Self::from_secret(group, group.rand_q(rng));
    }

    pub fn get_pk(&self) -> &ElGamalPublicKey {
        &self.pk
    }

    pub fn get_sk(&self) -> &ElGamalSecretKey {
        &self.sk
    }
}

/// An exponential ElGamal ciphertext (A, B) = (g ** r, (g ** m)(K ** r))
#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub struct ElGamalCiphertext {
    pad: ElementModP,
    data: ElementModP,
}

impl ElGamalCiphertext {
    pub fn new(pad: ElementModP, data: ElementModP) -> Self {
        return Self { pad, data };
    }

    /// Encrypt a small plaintext under the public key with the given nonce
    pub fn encrypt(
        group: &Group,
        plaintext: u64,
        nonce: &ElementModQ,
        pk: &ElGamalPublicKey,
    ) -> Self {
        let pad = group.g_pow_p(nonce);
        let gm = group.g_pow_p(&ElementModQ::from_u64(plaintext));
        let data = group.mult_p(&gm, &group.pow_p(pk.get_key(), nonce));
        return Self::new(pad, data);
    }

    pub fn get_pad(&self) -> &ElementModP {
        &self.pad
    }

    pub fn get_data(&self) -> &ElementModP {
        &self.data
    }

    /// Component-wise product, which encrypts the sum of the plaintexts
    pub fn add(&self, group: &Group, other: &Self) -> Self {
        return Self::new(
            group.mult_p(&self.pad, &other.pad),
            group.mult_p(&self.data, &other.data),
        );
    }

    /// The partial decryption A ** s contributed by the holder of the secret exponent s
    pub fn partial_decrypt(&self, group: &Group, secret: &ElementModQ) -> ElementModP {
        return group.pow_p(&self.pad, secret);
    }
}
