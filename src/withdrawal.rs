// Copyright 2025 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//    https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cut-and-choose withdrawal.
//!
//! The payer submits a batch of blinded candidate coins under their account
//! identity. The bank picks one at random and the payer opens every other
//! candidate: content, blinding factor and identity secrets. The bank
//! re-blinds each opened candidate, checks it against the submission and
//! checks that every repetition encodes the payer. Only then does it sign
//! the one it picked:
//!
//! ```text
//! payer                                  bank
//! PendingWithdrawal::new  -- request -->
//!                         <- challenge -- BankContext::challenge
//! PendingWithdrawal::open -- opening -->
//!                         <- blind sig -- BankContext::verify_and_sign
//! PendingWithdrawal::finish
//! ```
//!
//! A cheating payer who hides one malformed candidate in a batch of `n` gets
//! it signed with probability `1/n`.

use std::collections::HashSet;

use rand_core::CryptoRngCore;
use tracing::{debug, info, warn};

use crate::blind::{self, BankKey, BankPublicKey, BlindSignature, BlindedMessage, BlindingFactor};
use crate::coin::{Coin, CoinContent};
use crate::error::{Error, Result};
use crate::identity::{self, IdentityFragment};
use crate::params::Params;

/// The bank's half of the protocol: parameters plus signing key.
///
/// Passed explicitly to every operation that signs; there is no global key.
#[derive(Debug)]
pub struct BankContext {
    params: Params,
    key: BankKey,
}

/// Step 1: the blinded candidates.
#[derive(Clone, Debug)]
pub struct WithdrawalRequest {
    /// The account being debited. Every candidate must encode it.
    pub owner: String,
    /// Value every candidate claims to carry.
    pub amount: u64,
    pub blinded: Vec<BlindedMessage>,
}

/// Step 2: the index the bank will sign.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Challenge {
    selected: usize,
    batch_size: usize,
}

impl Challenge {
    pub fn selected(&self) -> usize {
        self.selected
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

/// Everything the bank needs to re-blind one candidate.
#[derive(Clone, Debug)]
pub struct OpenedCandidate {
    /// The candidate's serialized coin.
    pub content: String,
    pub blinding_factor: BlindingFactor,
    /// Both identity secrets of every repetition.
    pub fragments: Vec<IdentityFragment>,
}

/// Step 3: every candidate opened except the selected one.
#[derive(Clone, Debug)]
pub struct Opening {
    pub selected: usize,
    pub candidates: Vec<Option<OpenedCandidate>>,
}

/// The payer's state between submitting a batch and unblinding.
#[derive(Debug)]
pub struct PendingWithdrawal {
    amount: u64,
    candidates: Vec<Coin>,
}

/// Draws an index in `0..n` without modulo bias.
fn uniform_index(n: usize, mut rng: impl CryptoRngCore) -> usize {
    let n = n as u64;
    let limit = u64::MAX - u64::MAX % n;
    loop {
        let v = rng.next_u64();
        if v < limit {
            return (v % n) as usize;
        }
    }
}

fn reject(reason: String) -> Error {
    warn!(%reason, "withdrawal batch rejected");
    Error::BatchVerificationFailed(reason)
}

impl BankContext {
    pub fn new(params: Params, key: BankKey) -> Self {
        BankContext { params, key }
    }

    /// Creates a bank with a fresh key of `params.key_bits()` bits.
    pub fn generate(params: Params, rng: impl CryptoRngCore) -> Result<Self> {
        let key = BankKey::generate(params.key_bits(), rng)?;
        Ok(BankContext { params, key })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn public(&self) -> &BankPublicKey {
        self.key.public()
    }

    /// Step 2: picks the candidate to sign.
    ///
    /// `rng` must be unpredictable to the payer; a payer who can guess the
    /// index can slip a malformed coin through.
    pub fn challenge(&self, request: &WithdrawalRequest, rng: impl CryptoRngCore) -> Result<Challenge> {
        let batch_size = request.blinded.len();
        if batch_size != self.params.batch_size() {
            return Err(reject(format!(
                "expected {} candidates, received {batch_size}",
                self.params.batch_size()
            )));
        }
        let selected = uniform_index(batch_size, rng);
        debug!(batch_size, "withdrawal challenge issued");
        Ok(Challenge {
            selected,
            batch_size,
        })
    }

    /// Step 4: checks every opened candidate and signs the selected one.
    ///
    /// # Errors
    ///
    /// [`Error::BatchVerificationFailed`] if the opening does not match the
    /// challenge, if any opened candidate re-blinds to a different value
    /// than was submitted, or if any opened candidate is not a coin of the
    /// requested amount and shape. The same holds when an opened
    /// candidate's identity secrets do not open its commitments or do not
    /// encode `request.owner`. Nothing is signed in that case.
    pub fn verify_and_sign(
        &self,
        request: &WithdrawalRequest,
        challenge: &Challenge,
        opening: &Opening,
    ) -> Result<BlindSignature> {
        let batch_size = request.blinded.len();
        if batch_size != challenge.batch_size || batch_size != self.params.batch_size() {
            return Err(reject(format!(
                "challenge was issued for {} candidates, request has {batch_size}",
                challenge.batch_size
            )));
        }
        if request.amount == 0 {
            return Err(reject("requested amount is zero".into()));
        }
        if request.owner.is_empty() {
            return Err(reject("request names no account".into()));
        }
        if opening.selected != challenge.selected || opening.candidates.len() != batch_size {
            return Err(reject("opening does not answer the challenge".into()));
        }

        let public = self.key.public();
        let mut guids = HashSet::with_capacity(batch_size);
        for (index, (opened, submitted)) in opening.candidates.iter().zip(&request.blinded).enumerate() {
            if index == challenge.selected {
                if opened.is_some() {
                    return Err(reject(format!("selected candidate {index} was opened")));
                }
                continue;
            }
            let Some(opened) = opened else {
                return Err(reject(format!("candidate {index} was not opened")));
            };

            let recomputed = blind::blind_with(opened.content.as_bytes(), &opened.blinding_factor, public);
            if &recomputed != submitted {
                return Err(reject(format!(
                    "candidate {index} does not re-blind to the submitted value"
                )));
            }

            let content = CoinContent::parse(&opened.content, self.params.bank_tag())
                .map_err(|e| reject(format!("candidate {index}: {e}")))?;
            if content.amount != request.amount {
                return Err(reject(format!(
                    "candidate {index} is worth {}, {} requested",
                    content.amount, request.amount
                )));
            }
            if content.repetitions() != self.params.repetitions() {
                return Err(reject(format!(
                    "candidate {index} has {} identity repetitions, {} required",
                    content.repetitions(),
                    self.params.repetitions()
                )));
            }
            if let Some(repetition) = identity::find_malformed(
                &request.owner,
                &opened.fragments,
                &content.left_hashes,
                &content.right_hashes,
            ) {
                return Err(reject(format!(
                    "candidate {index} does not encode the account at repetition {repetition}"
                )));
            }
            if !guids.insert(content.guid) {
                return Err(reject(format!("candidate {index} reuses guid {}", content.guid)));
            }
        }

        let signature = blind::sign(&request.blinded[challenge.selected], &self.key);
        info!(amount = request.amount, batch_size, "withdrawal batch signed");
        Ok(signature)
    }
}

impl PendingWithdrawal {
    /// Step 1: mints and blinds `params.batch_size()` candidates.
    pub fn new(
        params: &Params,
        public: &BankPublicKey,
        owner: &str,
        amount: u64,
        mut rng: impl CryptoRngCore,
    ) -> Result<(Self, WithdrawalRequest)> {
        let mut candidates = Vec::with_capacity(params.batch_size());
        for _ in 0..params.batch_size() {
            let mut coin = Coin::new(params, owner, amount, &mut rng)?;
            coin.blind(public, &mut rng);
            candidates.push(coin);
        }
        Self::from_candidates(owner, amount, candidates)
    }

    /// Wraps candidates that were minted and blinded elsewhere.
    pub fn from_candidates(
        owner: &str,
        amount: u64,
        candidates: Vec<Coin>,
    ) -> Result<(Self, WithdrawalRequest)> {
        let blinded = candidates
            .iter()
            .map(|coin| coin.blinded().cloned().ok_or(Error::NotBlinded))
            .collect::<Result<Vec<_>>>()?;
        debug!(amount, batch_size = blinded.len(), "withdrawal batch submitted");
        Ok((
            PendingWithdrawal { amount, candidates },
            WithdrawalRequest {
                owner: owner.to_owned(),
                amount,
                blinded,
            },
        ))
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn candidates(&self) -> &[Coin] {
        &self.candidates
    }

    /// Step 3: opens every candidate except the selected one.
    pub fn open(&self, challenge: &Challenge) -> Result<Opening> {
        if challenge.batch_size != self.candidates.len() || challenge.selected >= self.candidates.len() {
            return Err(Error::BatchVerificationFailed(
                "challenge does not fit this batch".into(),
            ));
        }
        let candidates = self
            .candidates
            .iter()
            .enumerate()
            .map(|(index, coin)| {
                if index == challenge.selected {
                    return Ok(None);
                }
                let blinding_factor = coin.blinding_factor().cloned().ok_or(Error::NotBlinded)?;
                Ok(Some(OpenedCandidate {
                    content: coin.hashed().to_owned(),
                    blinding_factor,
                    fragments: coin.fragments().to_vec(),
                }))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Opening {
            selected: challenge.selected,
            candidates,
        })
    }

    /// Step 5: unblinds the bank's signature onto the selected coin.
    pub fn finish(
        mut self,
        challenge: &Challenge,
        blind_signature: &BlindSignature,
        public: &BankPublicKey,
    ) -> Result<Coin> {
        if challenge.selected >= self.candidates.len() {
            return Err(Error::BatchVerificationFailed(
                "challenge does not fit this batch".into(),
            ));
        }
        let mut coin = self.candidates.swap_remove(challenge.selected);
        coin.unblind(blind_signature, public)?;
        debug!(guid = %coin.guid(), "coin unblinded");
        Ok(coin)
    }
}

/// Runs a whole withdrawal between an honest payer and `bank`.
///
/// The payer and the bank draw from separate generators.
pub fn withdraw(
    bank: &BankContext,
    owner: &str,
    amount: u64,
    mut payer_rng: impl CryptoRngCore,
    bank_rng: impl CryptoRngCore,
) -> Result<Coin> {
    let (pending, request) = PendingWithdrawal::new(bank.params(), bank.public(), owner, amount, &mut payer_rng)?;
    let challenge = bank.challenge(&request, bank_rng)?;
    let opening = pending.open(&challenge)?;
    let blind_signature = bank.verify_and_sign(&request, &challenge, &opening)?;
    pending.finish(&challenge, &blind_signature, bank.public())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commitment;
    use crate::identity::{IDENT_MARKER, IdentityCommitments};
    use crate::tests::{test_bank, test_params};
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_core::{OsRng, RngCore};

    /// Honestly committed random secrets that encode nobody.
    fn anonymous_identity(repetitions: usize, len: usize) -> IdentityCommitments {
        let mut fragments = Vec::with_capacity(repetitions);
        let mut left_hashes = Vec::with_capacity(repetitions);
        let mut right_hashes = Vec::with_capacity(repetitions);
        for _ in 0..repetitions {
            let mut left = vec![0u8; len];
            let mut right = vec![0u8; len];
            OsRng.fill_bytes(&mut left);
            OsRng.fill_bytes(&mut right);
            left_hashes.push(commitment::commit(&left));
            right_hashes.push(commitment::commit(&right));
            fragments.push(IdentityFragment { left, right });
        }
        IdentityCommitments {
            fragments,
            left_hashes,
            right_hashes,
        }
    }

    #[test]
    fn honest_withdrawal_yields_a_verifiable_coin() {
        let bank = test_bank();
        let coin = withdraw(bank, "alice", 20, OsRng, OsRng).unwrap();
        assert_eq!(coin.amount(), 20);
        assert!(blind::verify(
            coin.signature().unwrap(),
            coin.hashed().as_bytes(),
            bank.public()
        ));
    }

    #[test]
    fn uniform_index_stays_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = [false; 5];
        for _ in 0..500 {
            seen[uniform_index(5, &mut rng)] = true;
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn opening_hides_only_the_selected_candidate() {
        let bank = test_bank();
        let (pending, request) =
            PendingWithdrawal::new(bank.params(), bank.public(), "alice", 20, OsRng).unwrap();
        let challenge = bank.challenge(&request, OsRng).unwrap();
        let opening = pending.open(&challenge).unwrap();
        for (index, candidate) in opening.candidates.iter().enumerate() {
            assert_eq!(candidate.is_none(), index == challenge.selected());
        }
    }

    #[test]
    fn corrupted_opening_aborts_the_batch() {
        let bank = test_bank();
        let (pending, request) =
            PendingWithdrawal::new(bank.params(), bank.public(), "alice", 20, OsRng).unwrap();
        let challenge = bank.challenge(&request, OsRng).unwrap();
        let mut opening = pending.open(&challenge).unwrap();

        let victim = (challenge.selected() + 1) % challenge.batch_size();
        let other = (challenge.selected() + 2) % challenge.batch_size();
        let replacement = pending.candidates()[other].hashed().to_owned();
        if let Some(candidate) = opening.candidates[victim].as_mut() {
            candidate.content = replacement;
        }

        let err = bank.verify_and_sign(&request, &challenge, &opening).unwrap_err();
        assert!(matches!(err, Error::BatchVerificationFailed(_)));
    }

    #[test]
    fn wrong_blinding_factor_aborts_the_batch() {
        let bank = test_bank();
        let (pending, request) =
            PendingWithdrawal::new(bank.params(), bank.public(), "alice", 20, OsRng).unwrap();
        let challenge = bank.challenge(&request, OsRng).unwrap();
        let mut opening = pending.open(&challenge).unwrap();

        let victim = (challenge.selected() + 1) % challenge.batch_size();
        let other = (challenge.selected() + 2) % challenge.batch_size();
        let foreign = opening.candidates[other].as_ref().unwrap().blinding_factor.clone();
        opening.candidates[victim].as_mut().unwrap().blinding_factor = foreign;

        assert!(matches!(
            bank.verify_and_sign(&request, &challenge, &opening),
            Err(Error::BatchVerificationFailed(_))
        ));
    }

    #[test]
    fn dishonest_candidate_is_caught_unless_selected() {
        let bank = test_bank();
        let params = bank.params();
        let mut candidates = Vec::new();
        for index in 0..params.batch_size() {
            let amount = if index == 0 { 1_000 } else { 20 };
            let mut coin = Coin::new(params, "mallory", amount, OsRng).unwrap();
            coin.blind(bank.public(), OsRng);
            candidates.push(coin);
        }
        let (pending, request) = PendingWithdrawal::from_candidates("mallory", 20, candidates).unwrap();

        for seed in 0..8 {
            let challenge = bank.challenge(&request, StdRng::seed_from_u64(seed)).unwrap();
            let opening = pending.open(&challenge).unwrap();
            let result = bank.verify_and_sign(&request, &challenge, &opening);
            if challenge.selected() == 0 {
                assert!(result.is_ok());
            } else {
                assert!(matches!(result, Err(Error::BatchVerificationFailed(_))));
            }
        }
    }

    #[test]
    fn anonymous_candidate_is_caught_unless_selected() {
        let bank = test_bank();
        let params = bank.params();
        let len = IDENT_MARKER.len() + "mallory".len();
        let mut candidates = Vec::new();
        for index in 0..params.batch_size() {
            let mut coin = if index == 0 {
                let ids = anonymous_identity(params.repetitions(), len);
                Coin::from_identity(params, "mallory", 20, ids, OsRng).unwrap()
            } else {
                Coin::new(params, "mallory", 20, OsRng).unwrap()
            };
            coin.blind(bank.public(), OsRng);
            candidates.push(coin);
        }
        let (pending, request) = PendingWithdrawal::from_candidates("mallory", 20, candidates).unwrap();

        for seed in 0..8 {
            let challenge = bank.challenge(&request, StdRng::seed_from_u64(seed)).unwrap();
            let opening = pending.open(&challenge).unwrap();
            let result = bank.verify_and_sign(&request, &challenge, &opening);
            if challenge.selected() == 0 {
                assert!(result.is_ok());
            } else {
                assert!(matches!(result, Err(Error::BatchVerificationFailed(_))));
            }
        }
    }

    #[test]
    fn candidates_for_another_account_are_refused() {
        let bank = test_bank();
        let params = bank.params();
        let mut candidates = Vec::new();
        for _ in 0..params.batch_size() {
            let mut coin = Coin::new(params, "alice", 20, OsRng).unwrap();
            coin.blind(bank.public(), OsRng);
            candidates.push(coin);
        }
        let (pending, request) = PendingWithdrawal::from_candidates("mallory", 20, candidates).unwrap();
        let challenge = bank.challenge(&request, OsRng).unwrap();
        let opening = pending.open(&challenge).unwrap();
        assert!(matches!(
            bank.verify_and_sign(&request, &challenge, &opening),
            Err(Error::BatchVerificationFailed(_))
        ));
    }

    #[test]
    fn secrets_that_do_not_open_their_hashes_abort_the_batch() {
        let bank = test_bank();
        let (pending, request) =
            PendingWithdrawal::new(bank.params(), bank.public(), "alice", 20, OsRng).unwrap();
        let challenge = bank.challenge(&request, OsRng).unwrap();
        let mut opening = pending.open(&challenge).unwrap();

        let victim = (challenge.selected() + 1) % challenge.batch_size();
        let candidate = opening.candidates[victim].as_mut().unwrap();
        let fragment = &mut candidate.fragments[0];
        std::mem::swap(&mut fragment.left, &mut fragment.right);

        assert!(matches!(
            bank.verify_and_sign(&request, &challenge, &opening),
            Err(Error::BatchVerificationFailed(_))
        ));
    }

    #[test]
    fn missing_fragments_abort_the_batch() {
        let bank = test_bank();
        let (pending, request) =
            PendingWithdrawal::new(bank.params(), bank.public(), "alice", 20, OsRng).unwrap();
        let challenge = bank.challenge(&request, OsRng).unwrap();
        let mut opening = pending.open(&challenge).unwrap();

        let victim = (challenge.selected() + 1) % challenge.batch_size();
        opening.candidates[victim].as_mut().unwrap().fragments.pop();

        assert!(matches!(
            bank.verify_and_sign(&request, &challenge, &opening),
            Err(Error::BatchVerificationFailed(_))
        ));
    }

    #[test]
    fn opening_the_selected_candidate_is_refused() {
        let bank = test_bank();
        let (pending, request) =
            PendingWithdrawal::new(bank.params(), bank.public(), "alice", 20, OsRng).unwrap();
        let challenge = bank.challenge(&request, OsRng).unwrap();
        let mut opening = pending.open(&challenge).unwrap();
        let other = (challenge.selected() + 1) % challenge.batch_size();
        opening.candidates[challenge.selected()] = opening.candidates[other].clone();

        assert!(bank.verify_and_sign(&request, &challenge, &opening).is_err());
    }

    #[test]
    fn wrong_batch_size_is_refused() {
        let bank = test_bank();
        let short = test_params().with_batch_size(3).unwrap();
        let (_, request) = PendingWithdrawal::new(&short, bank.public(), "alice", 20, OsRng).unwrap();
        assert!(matches!(
            bank.challenge(&request, OsRng),
            Err(Error::BatchVerificationFailed(_))
        ));
    }

    #[test]
    fn foreign_bank_tag_is_refused() {
        let bank = test_bank();
        let foreign = test_params().with_bank_tag("OTHER_BANK").unwrap();
        let (pending, request) = PendingWithdrawal::new(&foreign, bank.public(), "alice", 20, OsRng).unwrap();
        let challenge = bank.challenge(&request, OsRng).unwrap();
        let opening = pending.open(&challenge).unwrap();
        assert!(matches!(
            bank.verify_and_sign(&request, &challenge, &opening),
            Err(Error::BatchVerificationFailed(_))
        ));
    }

    #[test]
    fn unblinded_candidates_cannot_be_submitted() {
        let bank = test_bank();
        let coin = Coin::new(bank.params(), "alice", 20, OsRng).unwrap();
        assert!(matches!(
            PendingWithdrawal::from_candidates("alice", 20, vec![coin]),
            Err(Error::NotBlinded)
        ));
    }
}
