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

//! Anonymous e-cash with after-the-fact double-spender identification.
//!
//! A payer withdraws a coin through a cut-and-choose RSA blind-signature
//! protocol, so the bank certifies the coin's value without seeing it. Each
//! coin commits to the payer's identity `k` times, split into left and right
//! halves. Every merchant asks for one random half per repetition. A single
//! spend reveals nothing; two spends of the same coin almost surely reveal
//! both halves of some repetition, and the bank reads the payer's identity
//! off their XOR.
//!
//! ```no_run
//! use blind_ecash::{BankContext, Merchant, Outcome, Params, detect, withdraw};
//! use rand_core::OsRng;
//!
//! let bank = BankContext::generate(Params::default(), OsRng)?;
//! let coin = withdraw(&bank, "alice", 20, OsRng, OsRng)?;
//!
//! let merchant = Merchant::new(bank.params().clone(), bank.public().clone());
//! let first = merchant.accept(&coin, OsRng)?;
//! let second = merchant.accept(&coin, OsRng)?;
//!
//! if let Outcome::PayerIdentified(owner) = detect(&coin.guid(), &first, &second) {
//!     println!("{owner} spent coin {} twice", coin.guid());
//! }
//! # Ok::<(), blind_ecash::Error>(())
//! ```

pub mod blind;
pub mod cbor;
pub mod coin;
pub mod commitment;
pub mod detect;
mod error;
pub mod identity;
pub mod ledger;
pub mod merchant;
pub mod params;
pub mod withdrawal;

pub use crate::blind::{BankKey, BankPublicKey, BlindSignature, BlindedMessage, BlindingFactor, Signature};
pub use crate::cbor::CborError;
pub use crate::coin::{Coin, CoinContent, CoinId};
pub use crate::commitment::Digest;
pub use crate::detect::{Outcome, detect};
pub use crate::error::{Error, Result};
pub use crate::identity::{IDENT_MARKER, Side};
pub use crate::ledger::{InMemorySpendLedger, LedgerEntry, Settlement, SpendLedger, settle};
pub use crate::merchant::{Merchant, Reveal, RevealSet};
pub use crate::params::Params;
pub use crate::withdrawal::{
    BankContext, Challenge, OpenedCandidate, Opening, PendingWithdrawal, WithdrawalRequest, withdraw,
};
