//! The encrypted tally (or ballot) that guardians partially decrypt
use crate::{elgamal::ElGamalCiphertext, group::ElementModQ, ContestId, SelectionId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The accumulated ciphertexts of one contest, bound to the contest definition by its hash
#[derive(Debug, Eq, PartialEq, Clone, Serialize, Deserialize)]
pub struct CiphertextTallyContest {
    object_id: ContestId,
    description_hash: ElementModQ,
    selections: HashMap<SelectionId, ElGamalCiphertext>,
}

impl CiphertextTallyContest {
    pub fn new(
        object_id: ContestId,
        description_hash: ElementModQ,
        selections: HashMap<SelectionId, ElGamalCiphertext>,
    ) -> Self {
        return Self {
            object_id,
            description_hash,
            selections,
        };
    }

    pub fn get_object_id(&self) -> &ContestId {
        &self.object_id
    }

    pub fn get_description_hash(&self) -> &ElementModQ {
        &self.description_hash
    }

    pub fn get_selections(&self) -> &HashMap<SelectionId, ElGamalCiphertext> {
        &self.selections
    }

    pub fn get_selection(&self, selection_id: &str) -> Option<&ElGamalCiphertext> {
        return self.selections.get(selection_id);
    }
}

#[derive(Debug, Eq, PartialEq, Clone, Serialize, Deserialize)]
pub struct CiphertextTally {
    object_id: String,
    contests: HashMap<ContestId, CiphertextTallyContest>,
}

impl CiphertextTally {
    pub fn new(object_id: String, contests: HashMap<ContestId, CiphertextTallyContest>) -> Self {
        return Self {
            object_id,
            contests,
        };
    }

    pub fn get_object_id(&self) -> &str {
        &self.object_id
    }

    pub fn get_contests(&self) -> &HashMap<ContestId, CiphertextTallyContest> {
        &self.contests
    }

    pub fn get_contest(&self, contest_id: &str) -> Option<&CiphertextTallyContest> {
        return self.contests.get(contest_id);
    }
}
