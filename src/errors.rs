//! Error types. Cryptographic rejection is reported through `ValidationError` values and is
//! never fatal inside this crate; deciding whether an invalid share aborts a tally is up to the
//! caller.
use crate::{ContestId, GuardianId, SelectionId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    #[error("modulus p is not prime")]
    CompositeModulus,
    #[error("order q is not an odd prime")]
    CompositeOrder,
    #[error("order q does not divide p - 1")]
    OrderDoesNotDivide,
    #[error("generator g is not an element of order q")]
    InvalidGenerator,
}

/// The reason a decryption share failed validation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("guardian {guardian_id} selection {selection_id}: missing data, neither proof nor recovered parts")]
    MissingData {
        guardian_id: GuardianId,
        selection_id: SelectionId,
    },
    #[error("guardian {guardian_id} selection {selection_id}: cannot have proof and recovery")]
    AmbiguousProof {
        guardian_id: GuardianId,
        selection_id: SelectionId,
    },
    #[error("guardian {guardian_id} selection {selection_id}: invalid proof")]
    InvalidProof {
        guardian_id: GuardianId,
        selection_id: SelectionId,
    },
    #[error("guardian {guardian_id} selection {selection_id}: invalid partial proof from guardian {compensating_guardian_id}")]
    InvalidPartialProof {
        guardian_id: GuardianId,
        selection_id: SelectionId,
        compensating_guardian_id: GuardianId,
    },
    #[error("guardian {guardian_id} selection {selection_id}: {provided} recovered parts, quorum is {required}")]
    InsufficientQuorum {
        guardian_id: GuardianId,
        selection_id: SelectionId,
        required: usize,
        provided: usize,
    },
    #[error("contest {contest_id} is not part of the encrypted tally")]
    MissingContest { contest_id: ContestId },
    #[error("contest {contest_id} has no ciphertext for selection {selection_id}")]
    MissingCiphertext {
        contest_id: ContestId,
        selection_id: SelectionId,
    },
    #[error("contest {contest_id}: description hash does not match the encrypted contest")]
    DescriptionHashMismatch { contest_id: ContestId },
}
