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

//! Double-spender identification.
//!
//! Two honest acceptances of the same coin pick the same side at every
//! repetition with probability `2^-k`. Otherwise some repetition was revealed
//! from both sides, and XORing the two halves yields `IDENT_MARKER || owner`.

use tracing::{info, warn};

use crate::coin::CoinId;
use crate::identity;
use crate::merchant::RevealSet;

/// Result of comparing two reveal sets for one coin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The coin was spent twice by this payer.
    PayerIdentified(String),
    /// The reveals differ but do not combine into an identity, so at least
    /// one of them did not come from the payer.
    MerchantFraud,
    /// The reveal sets are identical. Honest merchants produce that only
    /// with probability `2^-k`, so a resubmitted reveal set is the likelier
    /// explanation.
    Inconclusive,
}

/// Compares two reveal sets reported for coin `guid`.
///
/// Reveal sets that belong to another coin are [`Outcome::MerchantFraud`].
pub fn detect(guid: &CoinId, first: &RevealSet, second: &RevealSet) -> Outcome {
    let outcome = if first.guid != *guid || second.guid != *guid {
        Outcome::MerchantFraud
    } else {
        compare(first, second)
    };
    match &outcome {
        Outcome::PayerIdentified(_) => info!(guid = %guid, "coin was double-spent by its owner"),
        Outcome::MerchantFraud => warn!(guid = %guid, "coin was reused fraudulently by a merchant"),
        Outcome::Inconclusive => warn!(guid = %guid, "reveal sets are identical; merchant is likely cheating"),
    }
    outcome
}

/// The comparison itself, on the revealed secrets only.
pub fn compare(first: &RevealSet, second: &RevealSet) -> Outcome {
    if first.guid != second.guid || first.len() != second.len() {
        return Outcome::MerchantFraud;
    }
    for (a, b) in first.secrets().zip(second.secrets()) {
        if a == b {
            continue;
        }
        return match identity::recover(a, b) {
            Some(owner) => Outcome::PayerIdentified(owner),
            None => Outcome::MerchantFraud,
        };
    }
    Outcome::Inconclusive
}
