//! Arithmetic in the order-q subgroup of the multiplicative group mod p
use crate::{errors::GroupError, BigInt, LIMBS};
use crypto_bigint::{
    modular::runtime_mod::{DynResidue, DynResidueParams},
    rand_core::OsRng,
    Integer, NonZero, RandomMod,
};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

/// An element of the multiplicative group (mod p). Values are not checked on construction;
/// use `Group::is_valid_residue` before trusting one received from another party.
#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub struct ElementModP(BigInt);

impl ElementModP {
    /// Instantiate an instance with no check
    pub fn new(val: BigInt) -> Self {
        return Self(val);
    }

    pub fn as_bigint(&self) -> &BigInt {
        &self.0
    }
}

/// An exponent (mod q)
#[derive(Debug, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
pub struct ElementModQ(BigInt);

impl ElementModQ {
    /// Instantiate an instance with no check
    pub fn new(val: BigInt) -> Self {
        return Self(val);
    }

    pub fn from_u64(val: u64) -> Self {
        return Self(BigInt::from_u64(val));
    }

    pub fn as_bigint(&self) -> &BigInt {
        &self.0
    }
}

/// The ambient group parameters (p, q, g): p and q are prime, q divides (p - 1), and g
/// generates the subgroup of order q.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub struct Group {
    p: BigInt,
    q: NonZero<BigInt>,
    g: BigInt,
}

impl Group {
    /// Instantiate the group after checking that the parameters are consistent
    pub fn new(p: BigInt, q: BigInt, g: BigInt) -> Result<Self, GroupError> {
        if !crypto_primes::is_prime(&p) {
            return Err(GroupError::CompositeModulus);
        }
        let q_is_odd: bool = q.is_odd().into();
        if !q_is_odd || !crypto_primes::is_prime(&q) {
            return Err(GroupError::CompositeOrder);
        }
        let q = Option::<NonZero<BigInt>>::from(NonZero::new(q))
            .ok_or(GroupError::CompositeOrder)?;
        if p.wrapping_sub(&BigInt::ONE) % q != BigInt::ZERO {
            return Err(GroupError::OrderDoesNotDivide);
        }
        let group = Self { p, q, g };
        if g <= BigInt::ONE || g >= p || !group.has_order_q(&g) {
            return Err(GroupError::InvalidGenerator);
        }
        return Ok(group);
    }

    /// Generate a group from a safe prime p = 2q + 1 of the given bit length. The generator is
    /// the square of a random element, which lands in the subgroup of quadratic residues.
    ///
    /// Small bit lengths are only good for testing; real elections use standardized published
    /// parameters.
    pub fn generate(bits: usize) -> Self {
        let p: BigInt = crypto_primes::generate_safe_prime(Some(bits));
        let q = p.shr_vartime(1);
        let params = DynResidueParams::new(&p);
        let p_nonzero = NonZero::from_uint(p);
        loop {
            let h = DynResidue::new(&BigInt::random_mod(&mut OsRng, &p_nonzero), params);
            let g = h.mul(&h).retrieve();
            if g > BigInt::ONE {
                if let Ok(group) = Self::new(p, q, g) {
                    return group;
                }
            }
        }
    }

    pub fn get_p(&self) -> &BigInt {
        &self.p
    }

    pub fn get_q(&self) -> &BigInt {
        &*self.q
    }

    pub fn get_g(&self) -> &BigInt {
        &self.g
    }

    fn p_params(&self) -> DynResidueParams<LIMBS> {
        return DynResidueParams::new(&self.p);
    }

    fn q_params(&self) -> DynResidueParams<LIMBS> {
        return DynResidueParams::new(&*self.q);
    }

    fn has_order_q(&self, val: &BigInt) -> bool {
        return DynResidue::new(val, self.p_params()).pow(&*self.q).retrieve() == BigInt::ONE;
    }

    /// base ** exp (mod p)
    pub fn pow_p(&self, base: &ElementModP, exp: &ElementModQ) -> ElementModP {
        let base = DynResidue::new(base.as_bigint(), self.p_params());
        return ElementModP::new(base.pow(exp.as_bigint()).retrieve());
    }

    /// g ** exp (mod p)
    pub fn g_pow_p(&self, exp: &ElementModQ) -> ElementModP {
        return self.pow_p(&ElementModP::new(self.g), exp);
    }

    pub fn mult_p(&self, lhs: &ElementModP, rhs: &ElementModP) -> ElementModP {
        let params = self.p_params();
        let lhs = DynResidue::new(lhs.as_bigint(), params);
        let rhs = DynResidue::new(rhs.as_bigint(), params);
        return ElementModP::new(lhs.mul(&rhs).retrieve());
    }

    pub fn add_q(&self, lhs: &ElementModQ, rhs: &ElementModQ) -> ElementModQ {
        let params = self.q_params();
        let lhs = DynResidue::new(lhs.as_bigint(), params);
        let rhs = DynResidue::new(rhs.as_bigint(), params);
        return ElementModQ::new(lhs.add(&rhs).retrieve());
    }

    pub fn mult_q(&self, lhs: &ElementModQ, rhs: &ElementModQ) -> ElementModQ {
        let params = self.q_params();
        let lhs = DynResidue::new(lhs.as_bigint(), params);
        let rhs = DynResidue::new(rhs.as_bigint(), params);
        return ElementModQ::new(lhs.mul(&rhs).retrieve());
    }

    /// Reduce an arbitrary integer into Z_q
    pub fn reduce_q(&self, val: &BigInt) -> ElementModQ {
        return ElementModQ::new(val % self.q);
    }

    /// Sample a uniformly random exponent from Z_q
    pub fn rand_q<R: CryptoRng + RngCore>(&self, rng: &mut R) -> ElementModQ {
        return ElementModQ::new(BigInt::random_mod(rng, &self.q));
    }

    /// Return true iff the value is a member of the order-q subgroup: 0 < val < p and
    /// val ** q = 1 (mod p)
    pub fn is_valid_residue(&self, val: &ElementModP) -> bool {
        let val = val.as_bigint();
        return *val > BigInt::ZERO && *val < self.p && self.has_order_q(val);
    }

    pub fn is_in_bounds_q(&self, val: &ElementModQ) -> bool {
        return *val.as_bigint() < *self.q;
    }
}
