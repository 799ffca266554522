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

//! Spent-coin bookkeeping.
//!
//! The bank keeps the first reveal set it sees for every coin. A second
//! deposit of the same guid is a double spend and goes to [`detect`].
//! Durable storage is the deployment's business; [`SpendLedger`] is the
//! interface it has to provide.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, PoisonError};

use tracing::debug;

use crate::coin::CoinId;
use crate::detect::{Outcome, detect};
use crate::merchant::RevealSet;

/// What the ledger knew about a guid before a write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerEntry {
    /// This call stored the reveal set.
    First,
    /// Another reveal set was stored earlier; it is returned unchanged.
    Seen(RevealSet),
}

/// Store of first-seen reveal sets, keyed by coin guid.
///
/// `record_first` must check and insert atomically per guid, so that two
/// concurrent deposits of one coin cannot both be `First`.
pub trait SpendLedger {
    fn record_first(&self, reveal_set: &RevealSet) -> LedgerEntry;

    fn get(&self, guid: &CoinId) -> Option<RevealSet>;
}

/// Process-local ledger behind a mutex.
#[derive(Debug, Default)]
pub struct InMemorySpendLedger {
    spent: Mutex<HashMap<CoinId, RevealSet>>,
}

impl InMemorySpendLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.spent.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SpendLedger for InMemorySpendLedger {
    fn record_first(&self, reveal_set: &RevealSet) -> LedgerEntry {
        // Every write is a plain insert, so a poisoned map is still consistent.
        let mut spent = self.spent.lock().unwrap_or_else(PoisonError::into_inner);
        match spent.entry(reveal_set.guid) {
            Entry::Occupied(previous) => LedgerEntry::Seen(previous.get().clone()),
            Entry::Vacant(slot) => {
                slot.insert(reveal_set.clone());
                LedgerEntry::First
            }
        }
    }

    fn get(&self, guid: &CoinId) -> Option<RevealSet> {
        self.spent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(guid)
            .cloned()
    }
}

/// Result of depositing a reveal set with the bank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Settlement {
    Accepted,
    DoubleSpend(Outcome),
}

/// Records `reveal_set` and runs detection if its coin was seen before.
pub fn settle(ledger: &impl SpendLedger, reveal_set: &RevealSet) -> Settlement {
    match ledger.record_first(reveal_set) {
        LedgerEntry::First => {
            debug!(guid = %reveal_set.guid, "first deposit recorded");
            Settlement::Accepted
        }
        LedgerEntry::Seen(previous) => {
            Settlement::DoubleSpend(detect(&reveal_set.guid, &previous, reveal_set))
        }
    }
}
