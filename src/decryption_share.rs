//! Partial decryption shares published by guardians at tally time.
//!
//! A present guardian decrypts every selection directly and proves the share against its own
//! public key. For a missing guardian, each available guardian computes a compensation fragment
//! from its backup of the missing guardian's secret and proves it against the corresponding
//! recovery key. A `SelectionDecryption` carries exactly one of the two kinds of evidence.
use crate::{
    elgamal::{ElGamalCiphertext, ElGamalPublicKey},
    errors::ValidationError,
    group::{ElementModP, ElementModQ, Group},
    proofs::chaum_pedersen::ChaumPedersenProof,
    tally::{CiphertextTally, CiphertextTallyContest},
    ContestId, GuardianId, SelectionId,
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// How strictly compensated selections are checked
#[derive(Debug, Default, Eq, PartialEq, Copy, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationPolicy {
    /// Minimum number of recovered parts a compensated selection must carry. `None` accepts any
    /// set of parts whose proofs verify, including an empty one.
    pub quorum: Option<usize>,
}

impl ValidationPolicy {
    pub fn with_quorum(quorum: usize) -> Self {
        return Self {
            quorum: Some(quorum),
        };
    }
}

/// A fragment of a missing guardian's partial decryption of a selection, computed by an
/// available guardian
#[derive(Debug, Eq, PartialEq, Clone, Serialize, Deserialize)]
pub struct CompensatedSelectionDecryption {
    object_id: SelectionId,

    /// The available guardian that computed this fragment
    guardian_id: GuardianId,

    /// The missing guardian on whose behalf the fragment is computed
    missing_guardian_id: GuardianId,

    /// M_{i,l}
    share: ElementModP,

    /// The recovery public key of the missing guardian that corresponds to the available
    /// guardian's backup of the missing guardian's secret
    recovery_key: ElementModP,

    proof: ChaumPedersenProof,
}

impl CompensatedSelectionDecryption {
    pub fn new(
        object_id: SelectionId,
        guardian_id: GuardianId,
        missing_guardian_id: GuardianId,
        share: ElementModP,
        recovery_key: ElementModP,
        proof: ChaumPedersenProof,
    ) -> Self {
        return Self {
            object_id,
            guardian_id,
            missing_guardian_id,
            share,
            recovery_key,
            proof,
        };
    }

    pub fn get_object_id(&self) -> &SelectionId {
        &self.object_id
    }

    pub fn get_guardian_id(&self) -> &GuardianId {
        &self.guardian_id
    }

    pub fn get_missing_guardian_id(&self) -> &GuardianId {
        &self.missing_guardian_id
    }

    pub fn get_share(&self) -> &ElementModP {
        &self.share
    }

    pub fn get_recovery_key(&self) -> &ElementModP {
        &self.recovery_key
    }

    pub fn get_proof(&self) -> &ChaumPedersenProof {
        &self.proof
    }

    fn verify_proof(
        &self,
        group: &Group,
        ciphertext: &ElGamalCiphertext,
        extended_base_hash: &ElementModQ,
    ) -> bool {
        return self.proof.is_valid(
            group,
            ciphertext,
            &self.recovery_key,
            &self.share,
            extended_base_hash,
        );
    }

    /// Check the fragment's proof against its recovery key
    pub fn validate(
        &self,
        group: &Group,
        ciphertext: &ElGamalCiphertext,
        extended_base_hash: &ElementModQ,
    ) -> Result<(), ValidationError> {
        if self.verify_proof(group, ciphertext, extended_base_hash) {
            return Ok(());
        }
        return Err(ValidationError::InvalidPartialProof {
            guardian_id: self.missing_guardian_id.clone(),
            selection_id: self.object_id.clone(),
            compensating_guardian_id: self.guardian_id.clone(),
        });
    }

    pub fn is_valid(
        &self,
        group: &Group,
        ciphertext: &ElGamalCiphertext,
        extended_base_hash: &ElementModQ,
    ) -> bool {
        return report(self.validate(group, ciphertext, extended_base_hash));
    }
}

/// The evidence behind a selection decryption
#[derive(Debug, Eq, PartialEq, Clone, Serialize, Deserialize)]
pub enum ProofOrRecovery {
    /// The guardian was available and decrypted the selection itself
    Proof(ChaumPedersenProof),

    /// The guardian was missing; the fragments from the available guardians are keyed by the
    /// available guardian's id
    Recovery(HashMap<GuardianId, CompensatedSelectionDecryption>),
}

impl From<ChaumPedersenProof> for ProofOrRecovery {
    fn from(proof: ChaumPedersenProof) -> Self {
        return Self::Proof(proof);
    }
}

impl From<HashMap<GuardianId, CompensatedSelectionDecryption>> for ProofOrRecovery {
    fn from(recovered_parts: HashMap<GuardianId, CompensatedSelectionDecryption>) -> Self {
        return Self::Recovery(recovered_parts);
    }
}

/// A guardian's partial decryption of a selection, either computed directly or compensated for
/// by a quorum of available guardians
#[derive(Debug, Eq, PartialEq, Clone, Serialize, Deserialize)]
#[serde(
    try_from = "SelectionDecryptionRecord",
    into = "SelectionDecryptionRecord"
)]
pub struct SelectionDecryption {
    object_id: SelectionId,
    guardian_id: GuardianId,

    /// M_i
    share: ElementModP,

    proof_or_recovery: ProofOrRecovery,
}

impl SelectionDecryption {
    pub fn new(
        object_id: SelectionId,
        guardian_id: GuardianId,
        share: ElementModP,
        proof_or_recovery: impl Into<ProofOrRecovery>,
    ) -> Self {
        return Self {
            object_id,
            guardian_id,
            share,
            proof_or_recovery: proof_or_recovery.into(),
        };
    }

    /// The guardian decrypted the selection itself
    pub fn from_proof(
        object_id: SelectionId,
        guardian_id: GuardianId,
        share: ElementModP,
        proof: ChaumPedersenProof,
    ) -> Self {
        return Self::new(object_id, guardian_id, share, ProofOrRecovery::Proof(proof));
    }

    /// The guardian's share was reconstructed from the available guardians' fragments
    pub fn from_recovered_parts(
        object_id: SelectionId,
        guardian_id: GuardianId,
        share: ElementModP,
        recovered_parts: HashMap<GuardianId, CompensatedSelectionDecryption>,
    ) -> Self {
        return Self::new(
            object_id,
            guardian_id,
            share,
            ProofOrRecovery::Recovery(recovered_parts),
        );
    }

    pub fn get_object_id(&self) -> &SelectionId {
        &self.object_id
    }

    pub fn get_guardian_id(&self) -> &GuardianId {
        &self.guardian_id
    }

    pub fn get_share(&self) -> &ElementModP {
        &self.share
    }

    pub fn get_proof_or_recovery(&self) -> &ProofOrRecovery {
        &self.proof_or_recovery
    }

    pub fn get_proof(&self) -> Option<&ChaumPedersenProof> {
        return match &self.proof_or_recovery {
            ProofOrRecovery::Proof(proof) => Some(proof),
            ProofOrRecovery::Recovery(_) => None,
        };
    }

    pub fn get_recovered_parts(
        &self,
    ) -> Option<&HashMap<GuardianId, CompensatedSelectionDecryption>> {
        return match &self.proof_or_recovery {
            ProofOrRecovery::Proof(_) => None,
            ProofOrRecovery::Recovery(parts) => Some(parts),
        };
    }

    pub fn is_compensated(&self) -> bool {
        return self.get_recovered_parts().is_some();
    }

    /// Check that the selection decryption is valid evidence for the partial decryption of
    /// `ciphertext` by the guardian holding `election_public_key`. A direct proof is checked
    /// against the guardian's key; recovered parts are each checked against their own recovery
    /// key, and the first failing part decides.
    pub fn validate(
        &self,
        group: &Group,
        ciphertext: &ElGamalCiphertext,
        election_public_key: &ElGamalPublicKey,
        extended_base_hash: &ElementModQ,
    ) -> Result<(), ValidationError> {
        match &self.proof_or_recovery {
            ProofOrRecovery::Proof(proof) => {
                if !proof.is_valid(
                    group,
                    ciphertext,
                    election_public_key.get_key(),
                    &self.share,
                    extended_base_hash,
                ) {
                    return Err(ValidationError::InvalidProof {
                        guardian_id: self.guardian_id.clone(),
                        selection_id: self.object_id.clone(),
                    });
                }
            }
            ProofOrRecovery::Recovery(parts) => {
                let invalid = parts
                    .iter()
                    .find(|(_, part)| !part.verify_proof(group, ciphertext, extended_base_hash));
                if let Some((compensating_guardian_id, _)) = invalid {
                    return Err(ValidationError::InvalidPartialProof {
                        guardian_id: self.guardian_id.clone(),
                        selection_id: self.object_id.clone(),
                        compensating_guardian_id: compensating_guardian_id.clone(),
                    });
                }
            }
        }
        return Ok(());
    }

    /// Same as `validate`, additionally rejecting compensated selections with fewer recovered
    /// parts than the policy's quorum
    pub fn validate_with_policy(
        &self,
        group: &Group,
        ciphertext: &ElGamalCiphertext,
        election_public_key: &ElGamalPublicKey,
        extended_base_hash: &ElementModQ,
        policy: &ValidationPolicy,
    ) -> Result<(), ValidationError> {
        if let (Some(required), Some(parts)) = (policy.quorum, self.get_recovered_parts()) {
            if parts.len() < required {
                return Err(ValidationError::InsufficientQuorum {
                    guardian_id: self.guardian_id.clone(),
                    selection_id: self.object_id.clone(),
                    required,
                    provided: parts.len(),
                });
            }
        }
        return self.validate(group, ciphertext, election_public_key, extended_base_hash);
    }

    /// Boolean form of `validate`; the failed invariant is logged as a warning
    pub fn is_valid(
        &self,
        group: &Group,
        ciphertext: &ElGamalCiphertext,
        election_public_key: &ElGamalPublicKey,
        extended_base_hash: &ElementModQ,
    ) -> bool {
        return report(self.validate(group, ciphertext, election_public_key, extended_base_hash));
    }
}

/// The published form of a selection decryption, where the proof and the recovered parts are
/// independent optional fields. Only a record with exactly one of them converts into a
/// `SelectionDecryption`.
#[derive(Debug, Eq, PartialEq, Clone, Serialize, Deserialize)]
pub struct SelectionDecryptionRecord {
    pub object_id: SelectionId,
    pub guardian_id: GuardianId,
    pub share: ElementModP,
    #[serde(default)]
    pub proof: Option<ChaumPedersenProof>,
    #[serde(default)]
    pub recovered_parts: Option<HashMap<GuardianId, CompensatedSelectionDecryption>>,
}

impl SelectionDecryptionRecord {
    pub fn validate(
        &self,
        group: &Group,
        ciphertext: &ElGamalCiphertext,
        election_public_key: &ElGamalPublicKey,
        extended_base_hash: &ElementModQ,
    ) -> Result<(), ValidationError> {
        let selection = SelectionDecryption::try_from(self.clone())?;
        return selection.validate(group, ciphertext, election_public_key, extended_base_hash);
    }

    pub fn is_valid(
        &self,
        group: &Group,
        ciphertext: &ElGamalCiphertext,
        election_public_key: &ElGamalPublicKey,
        extended_base_hash: &ElementModQ,
    ) -> bool {
        return report(self.validate(group, ciphertext, election_public_key, extended_base_hash));
    }
}

impl TryFrom<SelectionDecryptionRecord> for SelectionDecryption {
    type Error = ValidationError;

    fn try_from(record: SelectionDecryptionRecord) -> Result<Self, Self::Error> {
        let SelectionDecryptionRecord {
            object_id,
            guardian_id,
            share,
            proof,
            recovered_parts,
        } = record;
        let err = match (proof, recovered_parts) {
            (Some(proof), None) => {
                return Ok(Self::new(object_id, guardian_id, share, proof));
            }
            (None, Some(parts)) => {
                return Ok(Self::new(object_id, guardian_id, share, parts));
            }
            (None, None) => ValidationError::MissingData {
                guardian_id,
                selection_id: object_id,
            },
            (Some(_), Some(_)) => ValidationError::AmbiguousProof {
                guardian_id,
                selection_id: object_id,
            },
        };
        warn!("malformed selection decryption record: {err}");
        return Err(err);
    }
}

impl From<SelectionDecryption> for SelectionDecryptionRecord {
    fn from(selection: SelectionDecryption) -> Self {
        let (proof, recovered_parts) = match selection.proof_or_recovery {
            ProofOrRecovery::Proof(proof) => (Some(proof), None),
            ProofOrRecovery::Recovery(parts) => (None, Some(parts)),
        };
        return Self {
            object_id: selection.object_id,
            guardian_id: selection.guardian_id,
            share: selection.share,
            proof,
            recovered_parts,
        };
    }
}

/// Log the reason of a failed validation and collapse the result into a boolean
fn report(result: Result<(), ValidationError>) -> bool {
    if let Err(err) = result {
        warn!("decryption share is invalid: {err}");
        return false;
    }
    return true;
}

fn check_description_hash(
    contest_id: &ContestId,
    description_hash: &ElementModQ,
    encrypted: &CiphertextTallyContest,
) -> Result<(), ValidationError> {
    if description_hash != encrypted.get_description_hash() {
        return Err(ValidationError::DescriptionHashMismatch {
            contest_id: contest_id.clone(),
        });
    }
    return Ok(());
}

fn find_ciphertext<'a>(
    encrypted: &'a CiphertextTallyContest,
    selection_id: &SelectionId,
) -> Result<&'a ElGamalCiphertext, ValidationError> {
    return encrypted
        .get_selection(selection_id)
        .ok_or_else(|| ValidationError::MissingCiphertext {
            contest_id: encrypted.get_object_id().clone(),
            selection_id: selection_id.clone(),
        });
}

fn find_contest<'a>(
    tally: &'a CiphertextTally,
    contest_id: &ContestId,
) -> Result<&'a CiphertextTallyContest, ValidationError> {
    return tally
        .get_contest(contest_id)
        .ok_or_else(|| ValidationError::MissingContest {
            contest_id: contest_id.clone(),
        });
}

/// A guardian's partial decryption of a contest
#[derive(Debug, Eq, PartialEq, Clone, Serialize, Deserialize)]
pub struct ContestDecryption {
    object_id: ContestId,
    guardian_id: GuardianId,

    /// The hash of the contest description that was encrypted
    description_hash: ElementModQ,

    selections: HashMap<SelectionId, SelectionDecryption>,
}

impl ContestDecryption {
    pub fn new(
        object_id: ContestId,
        guardian_id: GuardianId,
        description_hash: ElementModQ,
        selections: HashMap<SelectionId, SelectionDecryption>,
    ) -> Self {
        return Self {
            object_id,
            guardian_id,
            description_hash,
            selections,
        };
    }

    pub fn get_object_id(&self) -> &ContestId {
        &self.object_id
    }

    pub fn get_guardian_id(&self) -> &GuardianId {
        &self.guardian_id
    }

    pub fn get_description_hash(&self) -> &ElementModQ {
        &self.description_hash
    }

    pub fn get_selections(&self) -> &HashMap<SelectionId, SelectionDecryption> {
        &self.selections
    }

    /// A contest decryption is valid iff it decrypts the same contest description and every
    /// selection decryption is valid for its ciphertext
    pub fn validate(
        &self,
        group: &Group,
        encrypted: &CiphertextTallyContest,
        election_public_key: &ElGamalPublicKey,
        extended_base_hash: &ElementModQ,
        policy: &ValidationPolicy,
    ) -> Result<(), ValidationError> {
        check_description_hash(&self.object_id, &self.description_hash, encrypted)?;
        for selection in self.selections.values() {
            let ciphertext = find_ciphertext(encrypted, selection.get_object_id())?;
            selection.validate_with_policy(
                group,
                ciphertext,
                election_public_key,
                extended_base_hash,
                policy,
            )?;
        }
        return Ok(());
    }
}

/// An available guardian's compensation fragments of a missing guardian's partial decryption
/// of a contest
#[derive(Debug, Eq, PartialEq, Clone, Serialize, Deserialize)]
pub struct CompensatedContestDecryption {
    object_id: ContestId,
    guardian_id: GuardianId,
    missing_guardian_id: GuardianId,
    description_hash: ElementModQ,
    selections: HashMap<SelectionId, CompensatedSelectionDecryption>,
}

impl CompensatedContestDecryption {
    pub fn new(
        object_id: ContestId,
        guardian_id: GuardianId,
        missing_guardian_id: GuardianId,
        description_hash: ElementModQ,
        selections: HashMap<SelectionId, CompensatedSelectionDecryption>,
    ) -> Self {
        return Self {
            object_id,
            guardian_id,
            missing_guardian_id,
            description_hash,
            selections,
        };
    }

    pub fn get_object_id(&self) -> &ContestId {
        &self.object_id
    }

    pub fn get_guardian_id(&self) -> &GuardianId {
        &self.guardian_id
    }

    pub fn get_missing_guardian_id(&self) -> &GuardianId {
        &self.missing_guardian_id
    }

    pub fn get_description_hash(&self) -> &ElementModQ {
        &self.description_hash
    }

    pub fn get_selections(&self) -> &HashMap<SelectionId, CompensatedSelectionDecryption> {
        &self.selections
    }

    pub fn validate(
        &self,
        group: &Group,
        encrypted: &CiphertextTallyContest,
        extended_base_hash: &ElementModQ,
    ) -> Result<(), ValidationError> {
        check_description_hash(&self.object_id, &self.description_hash, encrypted)?;
        for selection in self.selections.values() {
            let ciphertext = find_ciphertext(encrypted, selection.get_object_id())?;
            selection.validate(group, ciphertext, extended_base_hash)?;
        }
        return Ok(());
    }
}

/// A guardian's partial decryption share of a tally or a ballot
#[derive(Debug, Eq, PartialEq, Clone, Serialize, Deserialize)]
pub struct DecryptionShare {
    object_id: String,
    guardian_id: GuardianId,

    /// The election public key of the guardian
    public_key: ElGamalPublicKey,

    contests: HashMap<ContestId, ContestDecryption>,
}

impl DecryptionShare {
    pub fn new(
        object_id: String,
        guardian_id: GuardianId,
        public_key: ElGamalPublicKey,
        contests: HashMap<ContestId, ContestDecryption>,
    ) -> Self {
        return Self {
            object_id,
            guardian_id,
            public_key,
            contests,
        };
    }

    pub fn get_object_id(&self) -> &str {
        &self.object_id
    }

    pub fn get_guardian_id(&self) -> &GuardianId {
        &self.guardian_id
    }

    pub fn get_public_key(&self) -> &ElGamalPublicKey {
        &self.public_key
    }

    pub fn get_contests(&self) -> &HashMap<ContestId, ContestDecryption> {
        &self.contests
    }

    /// Validate every contest of the share against the encrypted tally, using the guardian's
    /// declared public key for direct proofs
    pub fn validate(
        &self,
        group: &Group,
        tally: &CiphertextTally,
        extended_base_hash: &ElementModQ,
        policy: &ValidationPolicy,
    ) -> Result<(), ValidationError> {
        for contest in self.contests.values() {
            let encrypted = find_contest(tally, contest.get_object_id())?;
            contest.validate(group, encrypted, &self.public_key, extended_base_hash, policy)?;
        }
        return Ok(());
    }

    pub fn is_valid(
        &self,
        group: &Group,
        tally: &CiphertextTally,
        extended_base_hash: &ElementModQ,
        policy: &ValidationPolicy,
    ) -> bool {
        return report(self.validate(group, tally, extended_base_hash, policy));
    }
}

/// A partial decryption share computed by an available guardian on behalf of a missing guardian
#[derive(Debug, Eq, PartialEq, Clone, Serialize, Deserialize)]
pub struct CompensatedDecryptionShare {
    object_id: String,
    guardian_id: GuardianId,
    missing_guardian_id: GuardianId,
    public_key: ElGamalPublicKey,
    contests: HashMap<ContestId, CompensatedContestDecryption>,
}

impl CompensatedDecryptionShare {
    pub fn new(
        object_id: String,
        guardian_id: GuardianId,
        missing_guardian_id: GuardianId,
        public_key: ElGamalPublicKey,
        contests: HashMap<ContestId, CompensatedContestDecryption>,
    ) -> Self {
        return Self {
            object_id,
            guardian_id,
            missing_guardian_id,
            public_key,
            contests,
        };
    }

    pub fn get_object_id(&self) -> &str {
        &self.object_id
    }

    pub fn get_guardian_id(&self) -> &GuardianId {
        &self.guardian_id
    }

    pub fn get_missing_guardian_id(&self) -> &GuardianId {
        &self.missing_guardian_id
    }

    pub fn get_public_key(&self) -> &ElGamalPublicKey {
        &self.public_key
    }

    pub fn get_contests(&self) -> &HashMap<ContestId, CompensatedContestDecryption> {
        &self.contests
    }

    /// Fragments are proven against recovery keys, so the guardian's own public key plays no
    /// part here
    pub fn validate(
        &self,
        group: &Group,
        tally: &CiphertextTally,
        extended_base_hash: &ElementModQ,
    ) -> Result<(), ValidationError> {
        for contest in self.contests.values() {
            let encrypted = find_contest(tally, contest.get_object_id())?;
            contest.validate(group, encrypted, extended_base_hash)?;
        }
        return Ok(());
    }

    pub fn is_valid(
        &self,
        group: &Group,
        tally: &CiphertextTally,
        extended_base_hash: &ElementModQ,
    ) -> bool {
        return report(self.validate(group, tally, extended_base_hash));
    }
}

/// Validate every guardian's share independently on the rayon thread pool
pub fn validate_shares(
    group: &Group,
    tally: &CiphertextTally,
    shares: &HashMap<GuardianId, DecryptionShare>,
    extended_base_hash: &ElementModQ,
    policy: &ValidationPolicy,
) -> HashMap<GuardianId, Result<(), ValidationError>> {
    let results: HashMap<GuardianId, Result<(), ValidationError>> = shares
        .par_iter()
        .map(|(guardian_id, share)| {
            let result = share.validate(group, tally, extended_base_hash, policy);
            return (guardian_id.clone(), result);
        })
        .collect();
    debug!(
        shares = results.len(),
        invalid = results.values().filter(|result| result.is_err()).count(),
        "validated decryption shares"
    );
    return results;
}

/// Collect every guardian's decryption of the selection with the given object id, together with
/// the guardian's public key. Selection ids are expected to be unique across contests; if one is
/// not, the entry seen last for a guardian wins.
pub fn get_shares_for_selection<'a>(
    selection_id: &str,
    shares: &'a HashMap<GuardianId, DecryptionShare>,
) -> HashMap<GuardianId, (ElGamalPublicKey, &'a SelectionDecryption)> {
    let mut selections = HashMap::new();
    for share in shares.values() {
        for contest in share.contests.values() {
            for selection in contest.selections.values() {
                if selection.object_id != selection_id {
                    continue;
                }
                let previous =
                    selections.insert(share.guardian_id.clone(), (share.public_key, selection));
                if previous.is_some() {
                    warn!(
                        guardian_id = %share.guardian_id,
                        selection_id = %selection_id,
                        "selection id appears in more than one contest"
                    );
                }
            }
        }
    }
    return selections;
}

/// Like `get_shares_for_selection`, but looks the selection up under a specific contest
pub fn get_shares_for_contest_selection<'a>(
    contest_id: &str,
    selection_id: &str,
    shares: &'a HashMap<GuardianId, DecryptionShare>,
) -> HashMap<GuardianId, (ElGamalPublicKey, &'a SelectionDecryption)> {
    return shares
        .values()
        .filter_map(|share| {
            let selection = share.contests.get(contest_id)?.selections.get(selection_id)?;
            return Some((share.guardian_id.clone(), (share.public_key, selection)));
        })
        .collect();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{elgamal::ElGamalKeyPair, BigInt};
    use tracing_test::traced_test;

    const GROUP_BITS: usize = 64;

    struct Setup {
        group: Group,
        extended_base_hash: ElementModQ,
        ciphertext: ElGamalCiphertext,
    }

    fn setup() -> Setup {
        let group = Group::generate(GROUP_BITS);
        let mut rng = rand::thread_rng();
        let joint_key = ElGamalKeyPair::keygen(&group, &mut rng);
        let nonce = group.rand_q(&mut rng);
        let ciphertext = ElGamalCiphertext::encrypt(&group, 1, &nonce, joint_key.get_pk());
        let extended_base_hash = group.rand_q(&mut rng);
        return Setup {
            group,
            extended_base_hash,
            ciphertext,
        };
    }

    fn direct_decryption(
        group: &Group,
        ciphertext: &ElGamalCiphertext,
        guardian_id: &str,
        keypair: &ElGamalKeyPair,
        selection_id: &str,
        extended_base_hash: &ElementModQ,
    ) -> SelectionDecryption {
        let secret = keypair.get_sk().get_secret();
        let share = ciphertext.partial_decrypt(group, secret);
        let proof = ChaumPedersenProof::make(
            group,
            ciphertext,
            secret,
            &share,
            &mut rand::thread_rng(),
            extended_base_hash,
        );
        return SelectionDecryption::from_proof(
            selection_id.to_string(),
            guardian_id.to_string(),
            share,
            proof,
        );
    }

    /// The available guardians hold points P(l) = s + a * l of a degree one polynomial through
    /// the missing guardian's secret s. Each fragment is proven against g ** P(l).
    fn compensation_fragments(
        group: &Group,
        ciphertext: &ElGamalCiphertext,
        missing_guardian_id: &str,
        missing: &ElGamalKeyPair,
        available_guardian_ids: &[&str],
        selection_id: &str,
        extended_base_hash: &ElementModQ,
    ) -> HashMap<GuardianId, CompensatedSelectionDecryption> {
        let mut rng = rand::thread_rng();
        let coefficient = group.rand_q(&mut rng);
        let secret = missing.get_sk().get_secret();
        let mut fragments = HashMap::new();
        for (index, guardian_id) in available_guardian_ids.iter().enumerate() {
            let point = ElementModQ::from_u64(index as u64 + 1);
            let backup = group.add_q(secret, &group.mult_q(&coefficient, &point));
            let share = ciphertext.partial_decrypt(group, &backup);
            let proof = ChaumPedersenProof::make(
                group,
                ciphertext,
                &backup,
                &share,
                &mut rng,
                extended_base_hash,
            );
            let fragment = CompensatedSelectionDecryption::new(
                selection_id.to_string(),
                guardian_id.to_string(),
                missing_guardian_id.to_string(),
                share,
                group.g_pow_p(&backup),
                proof,
            );
            fragments.insert(guardian_id.to_string(), fragment);
        }
        return fragments;
    }

    fn compensated_decryption(
        group: &Group,
        ciphertext: &ElGamalCiphertext,
        missing_guardian_id: &str,
        missing: &ElGamalKeyPair,
        available_guardian_ids: &[&str],
        selection_id: &str,
        extended_base_hash: &ElementModQ,
    ) -> SelectionDecryption {
        let fragments = compensation_fragments(
            group,
            ciphertext,
            missing_guardian_id,
            missing,
            available_guardian_ids,
            selection_id,
            extended_base_hash,
        );
        let share = ciphertext.partial_decrypt(group, missing.get_sk().get_secret());
        return SelectionDecryption::from_recovered_parts(
            selection_id.to_string(),
            missing_guardian_id.to_string(),
            share,
            fragments,
        );
    }

    fn flip_low_bit(elem: &ElementModP) -> ElementModP {
        return ElementModP::new(*elem.as_bigint() ^ BigInt::ONE);
    }

    #[test]
    fn test_direct_proof_is_valid() {
        let Setup {
            group,
            extended_base_hash,
            ciphertext,
        } = setup();
        let keypair = ElGamalKeyPair::keygen(&group, &mut rand::thread_rng());
        let selection =
            direct_decryption(&group, &ciphertext, "A", &keypair, "S1", &extended_base_hash);
        assert_eq!(
            selection.validate(&group, &ciphertext, keypair.get_pk(), &extended_base_hash),
            Ok(())
        );
        assert!(selection.is_valid(&group, &ciphertext, keypair.get_pk(), &extended_base_hash));
    }

    /// The proof binds the share to the guardian's key, the ciphertext, and the election
    #[test]
    fn test_direct_proof_soundness() {
        let Setup {
            group,
            extended_base_hash,
            ciphertext,
        } = setup();
        let mut rng = rand::thread_rng();
        let keypair = ElGamalKeyPair::keygen(&group, &mut rng);
        let selection =
            direct_decryption(&group, &ciphertext, "A", &keypair, "S1", &extended_base_hash);
        let invalid_proof = Err(ValidationError::InvalidProof {
            guardian_id: "A".to_string(),
            selection_id: "S1".to_string(),
        });

        let wrong_key = ElGamalKeyPair::keygen(&group, &mut rng);
        assert_eq!(
            selection.validate(&group, &ciphertext, wrong_key.get_pk(), &extended_base_hash),
            invalid_proof
        );

        let wrong_hash = group.add_q(&extended_base_hash, &ElementModQ::from_u64(1));
        assert_eq!(
            selection.validate(&group, &ciphertext, keypair.get_pk(), &wrong_hash),
            invalid_proof
        );

        let nonce = group.rand_q(&mut rng);
        let wrong_ciphertext = ElGamalCiphertext::encrypt(&group, 1, &nonce, keypair.get_pk());
        assert_eq!(
            selection.validate(&group, &wrong_ciphertext, keypair.get_pk(), &extended_base_hash),
            invalid_proof
        );
    }

    #[test]
    fn test_recovered_parts_are_valid() {
        let Setup {
            group,
            extended_base_hash,
            ciphertext,
        } = setup();
        let missing = ElGamalKeyPair::keygen(&group, &mut rand::thread_rng());
        let selection = compensated_decryption(
            &group,
            &ciphertext,
            "C",
            &missing,
            &["A", "B"],
            "S1",
            &extended_base_hash,
        );
        // the missing guardian's own key plays no part in checking the fragments
        let unrelated = ElGamalKeyPair::keygen(&group, &mut rand::thread_rng());
        assert!(selection.is_compensated());
        assert!(selection.is_valid(&group, &ciphertext, unrelated.get_pk(), &extended_base_hash));
    }

    #[test]
    fn test_corrupted_fragment_invalidates_selection() {
        let Setup {
            group,
            extended_base_hash,
            ciphertext,
        } = setup();
        let missing = ElGamalKeyPair::keygen(&group, &mut rand::thread_rng());
        let mut fragments = compensation_fragments(
            &group,
            &ciphertext,
            "C",
            &missing,
            &["A", "B"],
            "S1",
            &extended_base_hash,
        );
        let honest = fragments["B"].clone();
        assert_eq!(honest.validate(&group, &ciphertext, &extended_base_hash), Ok(()));
        let corrupted = CompensatedSelectionDecryption::new(
            honest.get_object_id().clone(),
            honest.get_guardian_id().clone(),
            honest.get_missing_guardian_id().clone(),
            flip_low_bit(honest.get_share()),
            *honest.get_recovery_key(),
            *honest.get_proof(),
        );
        assert!(!corrupted.is_valid(&group, &ciphertext, &extended_base_hash));
        fragments.insert("B".to_string(), corrupted);

        let share = ciphertext.partial_decrypt(&group, missing.get_sk().get_secret());
        let selection = SelectionDecryption::from_recovered_parts(
            "S1".to_string(),
            "C".to_string(),
            share,
            fragments,
        );
        assert_eq!(
            selection.validate(&group, &ciphertext, missing.get_pk(), &extended_base_hash),
            Err(ValidationError::InvalidPartialProof {
                guardian_id: "C".to_string(),
                selection_id: "S1".to_string(),
                compensating_guardian_id: "B".to_string(),
            })
        );
    }

    #[test]
    fn test_validation_is_idempotent() {
        let Setup {
            group,
            extended_base_hash,
            ciphertext,
        } = setup();
        let keypair = ElGamalKeyPair::keygen(&group, &mut rand::thread_rng());
        let selection =
            direct_decryption(&group, &ciphertext, "A", &keypair, "S1", &extended_base_hash);
        let forged = SelectionDecryption::new(
            "S1".to_string(),
            "A".to_string(),
            flip_low_bit(selection.get_share()),
            *selection.get_proof().unwrap(),
        );
        for _ in 0..2 {
            assert!(selection.is_valid(&group, &ciphertext, keypair.get_pk(), &extended_base_hash));
            assert!(!forged.is_valid(&group, &ciphertext, keypair.get_pk(), &extended_base_hash));
        }
    }

    #[test]
    fn test_factory_produces_one_kind_of_evidence() {
        let Setup {
            group,
            extended_base_hash,
            ciphertext,
        } = setup();
        let mut rng = rand::thread_rng();
        let keypair = ElGamalKeyPair::keygen(&group, &mut rng);
        let direct =
            direct_decryption(&group, &ciphertext, "A", &keypair, "S1", &extended_base_hash);
        let proof = *direct.get_proof().unwrap();
        let from_proof =
            SelectionDecryption::new("S1".to_string(), "A".to_string(), *direct.get_share(), proof);
        assert_eq!(from_proof.get_proof(), Some(&proof));
        assert!(from_proof.get_recovered_parts().is_none());

        let fragments = compensation_fragments(
            &group,
            &ciphertext,
            "C",
            &keypair,
            &["A", "B"],
            "S1",
            &extended_base_hash,
        );
        let from_parts = SelectionDecryption::new(
            "S1".to_string(),
            "C".to_string(),
            *direct.get_share(),
            fragments.clone(),
        );
        assert!(from_parts.get_proof().is_none());
        assert_eq!(from_parts.get_recovered_parts(), Some(&fragments));
    }

    /// Records with neither or both kinds of evidence are rejected whatever the other inputs
    #[test]
    fn test_malformed_records_are_invalid() {
        let Setup {
            group,
            extended_base_hash,
            ciphertext,
        } = setup();
        let keypair = ElGamalKeyPair::keygen(&group, &mut rand::thread_rng());
        let direct =
            direct_decryption(&group, &ciphertext, "A", &keypair, "S1", &extended_base_hash);
        let fragments = compensation_fragments(
            &group,
            &ciphertext,
            "A",
            &keypair,
            &["B", "C"],
            "S1",
            &extended_base_hash,
        );
        let well_formed = SelectionDecryptionRecord::from(direct.clone());
        assert!(well_formed.is_valid(&group, &ciphertext, keypair.get_pk(), &extended_base_hash));

        let missing = SelectionDecryptionRecord {
            proof: None,
            ..well_formed.clone()
        };
        assert_eq!(
            missing.validate(&group, &ciphertext, keypair.get_pk(), &extended_base_hash),
            Err(ValidationError::MissingData {
                guardian_id: "A".to_string(),
                selection_id: "S1".to_string(),
            })
        );

        let ambiguous = SelectionDecryptionRecord {
            recovered_parts: Some(fragments),
            ..well_formed
        };
        assert_eq!(
            ambiguous.validate(&group, &ciphertext, keypair.get_pk(), &extended_base_hash),
            Err(ValidationError::AmbiguousProof {
                guardian_id: "A".to_string(),
                selection_id: "S1".to_string(),
            })
        );
        assert!(!ambiguous.is_valid(&group, &ciphertext, keypair.get_pk(), &extended_base_hash));
    }

    #[traced_test]
    #[test]
    fn test_deserializing_malformed_record_fails() {
        let Setup {
            group,
            extended_base_hash,
            ciphertext,
        } = setup();
        let keypair = ElGamalKeyPair::keygen(&group, &mut rand::thread_rng());
        let direct =
            direct_decryption(&group, &ciphertext, "A", &keypair, "S1", &extended_base_hash);

        let json = serde_json::to_string(&direct).unwrap();
        let parsed: SelectionDecryption = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, direct);

        let record = SelectionDecryptionRecord {
            proof: None,
            ..SelectionDecryptionRecord::from(direct)
        };
        let json = serde_json::to_string(&record).unwrap();
        let err = serde_json::from_str::<SelectionDecryption>(&json).unwrap_err();
        assert!(err.to_string().contains("missing data"));
        assert!(logs_contain("malformed selection decryption record"));
    }

    #[test]
    fn test_quorum_policy() {
        let Setup {
            group,
            extended_base_hash,
            ciphertext,
        } = setup();
        let missing = ElGamalKeyPair::keygen(&group, &mut rand::thread_rng());
        let selection = compensated_decryption(
            &group,
            &ciphertext,
            "C",
            &missing,
            &["A", "B"],
            "S1",
            &extended_base_hash,
        );
        let pk = missing.get_pk();
        let default = ValidationPolicy::default();
        assert_eq!(
            selection.validate_with_policy(&group, &ciphertext, pk, &extended_base_hash, &default),
            Ok(())
        );
        let met = ValidationPolicy::with_quorum(2);
        assert_eq!(
            selection.validate_with_policy(&group, &ciphertext, pk, &extended_base_hash, &met),
            Ok(())
        );
        let unmet = ValidationPolicy::with_quorum(3);
        assert_eq!(
            selection.validate_with_policy(&group, &ciphertext, pk, &extended_base_hash, &unmet),
            Err(ValidationError::InsufficientQuorum {
                guardian_id: "C".to_string(),
                selection_id: "S1".to_string(),
                required: 3,
                provided: 2,
            })
        );

        // an empty set of parts is only rejected when a quorum is configured
        let empty = SelectionDecryption::from_recovered_parts(
            "S1".to_string(),
            "C".to_string(),
            *selection.get_share(),
            HashMap::new(),
        );
        assert!(empty.is_valid(&group, &ciphertext, pk, &extended_base_hash));
        assert!(empty
            .validate_with_policy(&group, &ciphertext, pk, &extended_base_hash, &met)
            .is_err());
    }

    #[test]
    fn test_policy_deserializes_with_defaults() {
        let policy: ValidationPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy, ValidationPolicy::default());
        let policy: ValidationPolicy = serde_json::from_str(r#"{"quorum": 2}"#).unwrap();
        assert_eq!(policy, ValidationPolicy::with_quorum(2));
    }

    #[traced_test]
    #[test]
    fn test_invalid_proof_is_logged() {
        let Setup {
            group,
            extended_base_hash,
            ciphertext,
        } = setup();
        let mut rng = rand::thread_rng();
        let keypair = ElGamalKeyPair::keygen(&group, &mut rng);
        let selection =
            direct_decryption(&group, &ciphertext, "A", &keypair, "S1", &extended_base_hash);
        let wrong_key = ElGamalKeyPair::keygen(&group, &mut rng);
        assert!(!selection.is_valid(&group, &ciphertext, wrong_key.get_pk(), &extended_base_hash));
        assert!(logs_contain("guardian A selection S1: invalid proof"));
    }

    /// Three guardians A, B and C decrypt a tally with contests "C1" = {S1, S2} and "C2" = {S3}
    struct Election {
        group: Group,
        extended_base_hash: ElementModQ,
        tally: CiphertextTally,
        guardians: Vec<(GuardianId, ElGamalKeyPair)>,
    }

    fn election() -> Election {
        let group = Group::generate(GROUP_BITS);
        let mut rng = rand::thread_rng();
        let joint_key = ElGamalKeyPair::keygen(&group, &mut rng);
        let mut encrypt = |plaintext| {
            let nonce = group.rand_q(&mut rng);
            return ElGamalCiphertext::encrypt(&group, plaintext, &nonce, joint_key.get_pk());
        };
        let first = CiphertextTallyContest::new(
            "C1".to_string(),
            ElementModQ::from_u64(11),
            HashMap::from([
                ("S1".to_string(), encrypt(1)),
                ("S2".to_string(), encrypt(0)),
            ]),
        );
        let second = CiphertextTallyContest::new(
            "C2".to_string(),
            ElementModQ::from_u64(22),
            HashMap::from([("S3".to_string(), encrypt(1))]),
        );
        let tally = CiphertextTally::new(
            "tally".to_string(),
            HashMap::from([("C1".to_string(), first), ("C2".to_string(), second)]),
        );
        let guardians = ["A", "B", "C"]
            .iter()
            .map(|id| (id.to_string(), ElGamalKeyPair::keygen(&group, &mut rng)))
            .collect();
        let extended_base_hash = group.rand_q(&mut rng);
        return Election {
            group,
            extended_base_hash,
            tally,
            guardians,
        };
    }

    /// Decrypt the listed contests of the tally directly
    fn decryption_share(
        election: &Election,
        guardian_id: &str,
        keypair: &ElGamalKeyPair,
        contest_ids: &[&str],
    ) -> DecryptionShare {
        let mut contests = HashMap::new();
        for contest_id in contest_ids {
            let encrypted = election.tally.get_contest(contest_id).unwrap();
            let selections = encrypted
                .get_selections()
                .iter()
                .map(|(selection_id, ciphertext)| {
                    let selection = direct_decryption(
                        &election.group,
                        ciphertext,
                        guardian_id,
                        keypair,
                        selection_id,
                        &election.extended_base_hash,
                    );
                    return (selection_id.clone(), selection);
                })
                .collect();
            let contest = ContestDecryption::new(
                contest_id.to_string(),
                guardian_id.to_string(),
                *encrypted.get_description_hash(),
                selections,
            );
            contests.insert(contest_id.to_string(), contest);
        }
        return DecryptionShare::new(
            "tally".to_string(),
            guardian_id.to_string(),
            *keypair.get_pk(),
            contests,
        );
    }

    #[test]
    fn test_get_shares_for_selection() {
        let election = election();
        let mut shares = HashMap::new();
        for (guardian_id, keypair) in &election.guardians {
            let contest_ids: &[&str] = if guardian_id == "C" { &["C2"] } else { &["C1", "C2"] };
            let share = decryption_share(&election, guardian_id, keypair, contest_ids);
            shares.insert(guardian_id.clone(), share);
        }

        let found = get_shares_for_selection("S1", &shares);
        let mut keys: Vec<&GuardianId> = found.keys().collect();
        keys.sort();
        assert_eq!(keys, vec!["A", "B"]);
        for (guardian_id, (public_key, selection)) in &found {
            let share = &shares[guardian_id];
            assert_eq!(public_key, share.get_public_key());
            assert_eq!(
                Some(*selection),
                share.get_contests()["C1"].get_selections().get("S1")
            );
        }

        assert!(get_shares_for_selection("S99", &shares).is_empty());

        let scoped = get_shares_for_contest_selection("C2", "S3", &shares);
        assert_eq!(scoped.len(), 3);
        assert!(get_shares_for_contest_selection("C2", "S1", &shares).is_empty());
    }

    #[test]
    fn test_validate_shares() {
        let election = election();
        let policy = ValidationPolicy::with_quorum(2);
        let mut shares = HashMap::new();
        for (guardian_id, keypair) in &election.guardians {
            let share = decryption_share(&election, guardian_id, keypair, &["C1", "C2"]);
            assert!(share.is_valid(
                &election.group,
                &election.tally,
                &election.extended_base_hash,
                &policy
            ));
            shares.insert(guardian_id.clone(), share);
        }

        // B publishes a share whose contest claims a different description
        let (_, keypair_b) = &election.guardians[1];
        let honest = decryption_share(&election, "B", keypair_b, &["C1"]);
        let contest = &honest.get_contests()["C1"];
        let tampered = ContestDecryption::new(
            "C1".to_string(),
            "B".to_string(),
            ElementModQ::from_u64(99),
            contest.get_selections().clone(),
        );
        let tampered = DecryptionShare::new(
            "tally".to_string(),
            "B".to_string(),
            *keypair_b.get_pk(),
            HashMap::from([("C1".to_string(), tampered)]),
        );
        shares.insert("B".to_string(), tampered);

        let results = validate_shares(
            &election.group,
            &election.tally,
            &shares,
            &election.extended_base_hash,
            &policy,
        );
        assert_eq!(results.len(), 3);
        assert_eq!(results["A"], Ok(()));
        assert_eq!(results["C"], Ok(()));
        assert_eq!(
            results["B"],
            Err(ValidationError::DescriptionHashMismatch {
                contest_id: "C1".to_string()
            })
        );
    }

    #[test]
    fn test_share_for_unknown_contest_is_invalid() {
        let election = election();
        let (_, keypair) = &election.guardians[0];
        let share = decryption_share(&election, "A", keypair, &["C1"]);
        let other_tally = CiphertextTally::new(
            "tally".to_string(),
            HashMap::from([(
                "C2".to_string(),
                election.tally.get_contest("C2").unwrap().clone(),
            )]),
        );
        assert_eq!(
            share.validate(
                &election.group,
                &other_tally,
                &election.extended_base_hash,
                &ValidationPolicy::default()
            ),
            Err(ValidationError::MissingContest {
                contest_id: "C1".to_string()
            })
        );
    }

    #[test]
    fn test_compensated_share() {
        let election = election();
        let (_, missing) = &election.guardians[2];
        let (_, available) = &election.guardians[0];
        let encrypted = election.tally.get_contest("C1").unwrap();
        let selections: HashMap<SelectionId, CompensatedSelectionDecryption> = encrypted
            .get_selections()
            .iter()
            .map(|(selection_id, ciphertext)| {
                let mut fragments = compensation_fragments(
                    &election.group,
                    ciphertext,
                    "C",
                    missing,
                    &["A"],
                    selection_id,
                    &election.extended_base_hash,
                );
                return (selection_id.clone(), fragments.remove("A").unwrap());
            })
            .collect();
        let contest = CompensatedContestDecryption::new(
            "C1".to_string(),
            "A".to_string(),
            "C".to_string(),
            *encrypted.get_description_hash(),
            selections,
        );
        let share = CompensatedDecryptionShare::new(
            "tally".to_string(),
            "A".to_string(),
            "C".to_string(),
            *available.get_pk(),
            HashMap::from([("C1".to_string(), contest.clone())]),
        );
        assert!(share.is_valid(&election.group, &election.tally, &election.extended_base_hash));

        // fragments for C1 do not decrypt the ciphertexts of C2
        let misplaced = CompensatedContestDecryption::new(
            "C2".to_string(),
            "A".to_string(),
            "C".to_string(),
            ElementModQ::from_u64(22),
            contest.get_selections().clone(),
        );
        let encrypted = election.tally.get_contest("C2").unwrap();
        assert!(misplaced
            .validate(&election.group, encrypted, &election.extended_base_hash)
            .is_err());
    }

    #[traced_test]
    #[test]
    fn test_repeated_selection_id_keeps_one_entry() {
        let election = election();
        let (_, keypair) = &election.guardians[0];
        let share = decryption_share(&election, "A", keypair, &["C1"]);
        let ciphertext = election.tally.get_contest("C2").unwrap().get_selection("S3").unwrap();
        let repeated = direct_decryption(
            &election.group,
            ciphertext,
            "A",
            keypair,
            "S1",
            &election.extended_base_hash,
        );
        let mut contests = share.get_contests().clone();
        contests.insert(
            "C2".to_string(),
            ContestDecryption::new(
                "C2".to_string(),
                "A".to_string(),
                ElementModQ::from_u64(22),
                HashMap::from([("S1".to_string(), repeated)]),
            ),
        );
        let share =
            DecryptionShare::new("tally".to_string(), "A".to_string(), *keypair.get_pk(), contests);
        let shares = HashMap::from([("A".to_string(), share)]);

        let found = get_shares_for_selection("S1", &shares);
        assert_eq!(found.len(), 1);
        assert_eq!(found["A"].1.get_object_id(), "S1");
        assert!(logs_contain("selection id appears in more than one contest"));
    }
}
