//! A sample tally decryption where one of three guardians is missing

use decryption_shares::decryption_share::{
    get_shares_for_selection, validate_shares, CompensatedContestDecryption,
    CompensatedDecryptionShare, CompensatedSelectionDecryption, ContestDecryption,
    DecryptionShare, SelectionDecryption, ValidationPolicy,
};
use decryption_shares::elgamal::{ElGamalCiphertext, ElGamalKeyPair, ElGamalPublicKey};
use decryption_shares::group::{ElementModP, ElementModQ, Group};
use decryption_shares::proofs::chaum_pedersen::ChaumPedersenProof;
use decryption_shares::tally::{CiphertextTally, CiphertextTallyContest};
use decryption_shares::{BigInt, SelectionId};
use rand::Rng;
use std::collections::HashMap;
use tracing::info;
use tracing_subscriber::EnvFilter;

const GROUP_BITS: usize = 64;
const VOTERS: usize = 10;
const CONTEST: &str = "referendum";
const SELECTIONS: [&str; 2] = ["yes", "no"];

/// Available guardians and the point at which each holds a backup of the missing guardian's
/// secret
const AVAILABLE: [(&str, u64); 2] = [("A", 1), ("B", 2)];
const MISSING: &str = "C";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let group = Group::generate(GROUP_BITS);
    let mut rng = rand::thread_rng();
    let extended_base_hash = group.rand_q(&mut rng);
    let description_hash = group.rand_q(&mut rng);

    let keypairs: HashMap<&str, ElGamalKeyPair> = ["A", "B", "C"]
        .iter()
        .map(|id| (*id, ElGamalKeyPair::keygen(&group, &mut rng)))
        .collect();
    let joint_key = ElGamalPublicKey::new(
        keypairs
            .values()
            .map(|keypair| *keypair.get_pk().get_key())
            .reduce(|lhs, rhs| group.mult_p(&lhs, &rhs))
            .expect("there is at least one guardian"),
    );

    // The missing guardian's secret sits on the line P(x) = s + ax; the available guardians
    // received P(1) and P(2) during the key ceremony
    let coefficient = group.rand_q(&mut rng);
    let backup_at = |point: u64| {
        let secret = keypairs[MISSING].get_sk().get_secret();
        return group.add_q(secret, &group.mult_q(&coefficient, &ElementModQ::from_u64(point)));
    };

    // Every voter picks exactly one selection
    let mut expected: HashMap<&str, u64> = SELECTIONS.iter().map(|id| (*id, 0)).collect();
    let mut accumulated: HashMap<SelectionId, ElGamalCiphertext> = HashMap::new();
    for _ in 0..VOTERS {
        let choice = SELECTIONS[rng.gen_range(0..SELECTIONS.len())];
        for selection in SELECTIONS {
            let vote = u64::from(selection == choice);
            *expected.get_mut(selection).expect("known selection") += vote;
            let nonce = group.rand_q(&mut rng);
            let ballot = ElGamalCiphertext::encrypt(&group, vote, &nonce, &joint_key);
            accumulated
                .entry(selection.to_string())
                .and_modify(|total| *total = total.add(&group, &ballot))
                .or_insert(ballot);
        }
    }
    let contest = CiphertextTallyContest::new(CONTEST.to_string(), description_hash, accumulated);
    let tally = CiphertextTally::new(
        "tally".to_string(),
        HashMap::from([(CONTEST.to_string(), contest.clone())]),
    );

    // Available guardians decrypt directly
    let mut shares: HashMap<String, DecryptionShare> = HashMap::new();
    for (guardian_id, _) in AVAILABLE {
        let keypair = &keypairs[guardian_id];
        let secret = keypair.get_sk().get_secret();
        let selections = contest
            .get_selections()
            .iter()
            .map(|(selection_id, ciphertext)| {
                let share = ciphertext.partial_decrypt(&group, secret);
                let proof = ChaumPedersenProof::make(
                    &group,
                    ciphertext,
                    secret,
                    &share,
                    &mut rand::thread_rng(),
                    &extended_base_hash,
                );
                let selection = SelectionDecryption::from_proof(
                    selection_id.clone(),
                    guardian_id.to_string(),
                    share,
                    proof,
                );
                return (selection_id.clone(), selection);
            })
            .collect();
        let decryption = ContestDecryption::new(
            CONTEST.to_string(),
            guardian_id.to_string(),
            description_hash,
            selections,
        );
        let share = DecryptionShare::new(
            "tally".to_string(),
            guardian_id.to_string(),
            *keypair.get_pk(),
            HashMap::from([(CONTEST.to_string(), decryption)]),
        );
        shares.insert(guardian_id.to_string(), share);
    }

    // Available guardians compensate for the missing one
    let mut compensated: Vec<CompensatedDecryptionShare> = vec![];
    for (guardian_id, point) in AVAILABLE {
        let backup = backup_at(point);
        let recovery_key = group.g_pow_p(&backup);
        let selections = contest
            .get_selections()
            .iter()
            .map(|(selection_id, ciphertext)| {
                let share = ciphertext.partial_decrypt(&group, &backup);
                let proof = ChaumPedersenProof::make(
                    &group,
                    ciphertext,
                    &backup,
                    &share,
                    &mut rand::thread_rng(),
                    &extended_base_hash,
                );
                let fragment = CompensatedSelectionDecryption::new(
                    selection_id.clone(),
                    guardian_id.to_string(),
                    MISSING.to_string(),
                    share,
                    recovery_key,
                    proof,
                );
                return (selection_id.clone(), fragment);
            })
            .collect();
        let decryption = CompensatedContestDecryption::new(
            CONTEST.to_string(),
            guardian_id.to_string(),
            MISSING.to_string(),
            description_hash,
            selections,
        );
        let share = CompensatedDecryptionShare::new(
            "tally".to_string(),
            guardian_id.to_string(),
            MISSING.to_string(),
            *keypairs[guardian_id].get_pk(),
            HashMap::from([(CONTEST.to_string(), decryption)]),
        );
        if !share.is_valid(&group, &tally, &extended_base_hash) {
            panic!("Compensated share of guardian {guardian_id} failed to verify");
        }
        compensated.push(share);
    }

    // Interpolate the missing guardian's share at x = 0 from the points 1 and 2, whose Lagrange
    // coefficients are 2 and -1
    let minus_one = ElementModQ::new(group.get_q().wrapping_sub(&BigInt::ONE));
    let weights = [ElementModQ::from_u64(2), minus_one];
    let mut missing_selections: HashMap<SelectionId, SelectionDecryption> = HashMap::new();
    for selection_id in contest.get_selections().keys() {
        let mut recovered_parts = HashMap::new();
        let mut share = ElementModP::new(BigInt::ONE);
        for (compensated_share, weight) in compensated.iter().zip(weights.iter()) {
            let fragments = compensated_share.get_contests()[CONTEST].get_selections();
            let fragment = &fragments[selection_id];
            share = group.mult_p(&share, &group.pow_p(fragment.get_share(), weight));
            recovered_parts.insert(compensated_share.get_guardian_id().clone(), fragment.clone());
        }
        let selection = SelectionDecryption::from_recovered_parts(
            selection_id.clone(),
            MISSING.to_string(),
            share,
            recovered_parts,
        );
        missing_selections.insert(selection_id.clone(), selection);
    }
    let decryption = ContestDecryption::new(
        CONTEST.to_string(),
        MISSING.to_string(),
        description_hash,
        missing_selections,
    );
    shares.insert(
        MISSING.to_string(),
        DecryptionShare::new(
            "tally".to_string(),
            MISSING.to_string(),
            *keypairs[MISSING].get_pk(),
            HashMap::from([(CONTEST.to_string(), decryption)]),
        ),
    );

    let policy = ValidationPolicy::with_quorum(AVAILABLE.len());
    let results = validate_shares(&group, &tally, &shares, &extended_base_hash, &policy);
    for (guardian_id, result) in results {
        if let Err(err) = result {
            panic!("Decryption share of guardian {guardian_id} is invalid: {err}");
        }
    }

    // B / (M_A * M_B * M_C) = g ** t
    for selection_id in SELECTIONS {
        let ciphertext = contest.get_selection(selection_id).expect("known selection");
        let product = get_shares_for_selection(selection_id, &shares)
            .values()
            .fold(ElementModP::new(BigInt::ONE), |acc, (_, selection)| {
                group.mult_p(&acc, selection.get_share())
            });
        let count = expected[selection_id];
        let plaintext = group.g_pow_p(&ElementModQ::from_u64(count));
        let reconstructed = group.mult_p(&plaintext, &product);
        if reconstructed != *ciphertext.get_data() {
            panic!("the tally of {selection_id} is incorrect!");
        }
        info!(selection_id, count, "decrypted selection");
    }
    println!("The decryption is a success!");
}
