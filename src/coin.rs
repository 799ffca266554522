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

//! Coins and their canonical serialization.
//!
//! The signed message of a coin is a single line of text:
//!
//! ```text
//! BANK_TAG-amount-guid-lh0,lh1,...,lhk-rh0,rh1,...,rhk
//! ```
//!
//! `amount` is decimal, `guid` is 32 hex characters and each hash is a
//! 64-character hex commitment. Parsing is strict: anything else is a
//! [`Error::MalformedCoin`].

use std::fmt;
use std::str::FromStr;

use rand_core::CryptoRngCore;

use crate::blind::{self, BankPublicKey, BlindSignature, BlindedMessage, BlindingFactor, Signature};
use crate::commitment::Digest;
use crate::error::{Error, Result};
use crate::identity::{self, IdentityCommitments, IdentityFragment, Side};
use crate::params::Params;

/// Separates the top-level fields of a serialized coin.
pub const FIELD_SEPARATOR: char = '-';

/// Separates the hashes inside the left and right hash lists.
pub const LIST_SEPARATOR: char = ',';

const FIELD_COUNT: usize = 5;

/// Length in bytes of a coin identifier.
pub const COIN_ID_LEN: usize = 16;

/// Globally unique coin identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoinId([u8; COIN_ID_LEN]);

impl CoinId {
    pub fn random(mut rng: impl CryptoRngCore) -> Self {
        let mut bytes = [0u8; COIN_ID_LEN];
        rng.fill_bytes(&mut bytes);
        CoinId(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; COIN_ID_LEN] {
        &self.0
    }
}

impl From<[u8; COIN_ID_LEN]> for CoinId {
    fn from(bytes: [u8; COIN_ID_LEN]) -> Self {
        CoinId(bytes)
    }
}

impl fmt::Display for CoinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for CoinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CoinId({self})")
    }
}

impl FromStr for CoinId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; COIN_ID_LEN];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| Error::MalformedCoin(format!("bad guid {s:?}: {e}")))?;
        Ok(CoinId(bytes))
    }
}

/// The public part of a coin: everything the bank signs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoinContent {
    pub amount: u64,
    pub guid: CoinId,
    pub left_hashes: Vec<Digest>,
    pub right_hashes: Vec<Digest>,
}

impl CoinContent {
    pub fn repetitions(&self) -> usize {
        self.left_hashes.len()
    }

    /// Renders the canonical form under `bank_tag`.
    pub fn serialize(&self, bank_tag: &str) -> String {
        let join = |hashes: &[Digest]| {
            hashes
                .iter()
                .map(Digest::to_string)
                .collect::<Vec<_>>()
                .join(&LIST_SEPARATOR.to_string())
        };
        [
            bank_tag.to_owned(),
            self.amount.to_string(),
            self.guid.to_string(),
            join(&self.left_hashes),
            join(&self.right_hashes),
        ]
        .join(&FIELD_SEPARATOR.to_string())
    }

    /// Parses a serialized coin, insisting that it was issued under
    /// `bank_tag`.
    pub fn parse(s: &str, bank_tag: &str) -> Result<Self> {
        let fields: Vec<&str> = s.split(FIELD_SEPARATOR).collect();
        let [tag, amount, guid, left, right] = fields[..] else {
            return Err(Error::MalformedCoin(format!(
                "expected {FIELD_COUNT} fields, found {}",
                fields.len()
            )));
        };

        if tag != bank_tag {
            return Err(Error::MalformedCoin(format!(
                "invalid identity string: {tag:?} received, but {bank_tag:?} expected"
            )));
        }

        if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::MalformedCoin(format!("bad amount {amount:?}")));
        }
        let amount: u64 = amount
            .parse()
            .map_err(|e| Error::MalformedCoin(format!("bad amount {amount:?}: {e}")))?;
        if amount == 0 {
            return Err(Error::MalformedCoin("zero amount".into()));
        }

        let guid: CoinId = guid.parse()?;
        let left_hashes = parse_hashes(left)?;
        let right_hashes = parse_hashes(right)?;
        if left_hashes.len() != right_hashes.len() {
            return Err(Error::MalformedCoin(format!(
                "{} left hashes but {} right hashes",
                left_hashes.len(),
                right_hashes.len()
            )));
        }

        Ok(CoinContent {
            amount,
            guid,
            left_hashes,
            right_hashes,
        })
    }
}

fn parse_hashes(list: &str) -> Result<Vec<Digest>> {
    list.split(LIST_SEPARATOR).map(Digest::from_str).collect()
}

/// One unit of value, as held by the payer.
///
/// Everything except the signature is fixed at creation. The signature is
/// attached once by [`Coin::unblind`] and never changes afterwards.
#[derive(Clone)]
pub struct Coin {
    owner: String,
    content: CoinContent,
    fragments: Vec<IdentityFragment>,
    hashed: String,
    blinded: Option<BlindedMessage>,
    blinding_factor: Option<BlindingFactor>,
    signature: Option<Signature>,
}

impl Coin {
    /// Mints an unsigned coin for `owner` worth `amount`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParams`] for a zero amount or an empty owner.
    pub fn new(params: &Params, owner: &str, amount: u64, mut rng: impl CryptoRngCore) -> Result<Self> {
        let ids = identity::build(owner, params.repetitions(), &mut rng);
        Self::from_identity(params, owner, amount, ids, rng)
    }

    /// Mints an unsigned coin around identity commitments built elsewhere.
    pub(crate) fn from_identity(
        params: &Params,
        owner: &str,
        amount: u64,
        ids: IdentityCommitments,
        mut rng: impl CryptoRngCore,
    ) -> Result<Self> {
        if amount == 0 {
            return Err(Error::InvalidParams("coin amount must be positive".into()));
        }
        if owner.is_empty() {
            return Err(Error::InvalidParams("coin owner is empty".into()));
        }

        let guid = CoinId::random(&mut rng);
        let content = CoinContent {
            amount,
            guid,
            left_hashes: ids.left_hashes,
            right_hashes: ids.right_hashes,
        };
        let hashed = content.serialize(params.bank_tag());

        Ok(Coin {
            owner: owner.to_owned(),
            content,
            fragments: ids.fragments,
            hashed,
            blinded: None,
            blinding_factor: None,
            signature: None,
        })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn amount(&self) -> u64 {
        self.content.amount
    }

    pub fn guid(&self) -> CoinId {
        self.content.guid
    }

    pub fn content(&self) -> &CoinContent {
        &self.content
    }

    pub fn left_hashes(&self) -> &[Digest] {
        &self.content.left_hashes
    }

    pub fn right_hashes(&self) -> &[Digest] {
        &self.content.right_hashes
    }

    pub fn repetitions(&self) -> usize {
        self.fragments.len()
    }

    /// The canonical serialization; this is what gets blinded and signed.
    pub fn hashed(&self) -> &str {
        &self.hashed
    }

    pub fn blinded(&self) -> Option<&BlindedMessage> {
        self.blinded.as_ref()
    }

    pub(crate) fn fragments(&self) -> &[IdentityFragment] {
        &self.fragments
    }

    pub(crate) fn blinding_factor(&self) -> Option<&BlindingFactor> {
        self.blinding_factor.as_ref()
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    /// Blinds the coin's message for the bank and keeps the factor.
    ///
    /// Blinding again replaces the previous factor.
    pub fn blind(&mut self, public: &BankPublicKey, rng: impl CryptoRngCore) -> (BlindedMessage, BlindingFactor) {
        let (blinded, factor) = blind::blind(self.hashed.as_bytes(), public, rng);
        self.blinded = Some(blinded.clone());
        self.blinding_factor = Some(factor.clone());
        (blinded, factor)
    }

    /// Turns the bank's blind signature into a signature on this coin.
    ///
    /// The result is checked with [`blind::verify`] before it is attached.
    /// A coin that is already signed keeps its signature.
    pub fn unblind(&mut self, blind_signature: &BlindSignature, public: &BankPublicKey) -> Result<&Signature> {
        if self.signature.is_some() {
            return self.signature.as_ref().ok_or(Error::InvalidSignature);
        }
        let factor = self.blinding_factor.as_ref().ok_or(Error::NotBlinded)?;
        let signature = blind::unblind(blind_signature, factor, public)?;
        if !blind::verify(&signature, self.hashed.as_bytes(), public) {
            return Err(Error::InvalidSignature);
        }
        Ok(&*self.signature.insert(signature))
    }

    /// The payer's answer to a merchant asking for one side of repetition
    /// `index`.
    pub fn reveal(&self, index: usize, side: Side) -> Option<&[u8]> {
        self.fragments.get(index).map(|fragment| fragment.secret(side))
    }

    #[cfg(test)]
    pub(crate) fn fragments_mut(&mut self) -> &mut Vec<IdentityFragment> {
        &mut self.fragments
    }

    #[cfg(test)]
    pub(crate) fn set_signature(&mut self, signature: Option<Signature>) {
        self.signature = signature;
    }
}

impl fmt::Debug for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coin")
            .field("amount", &self.content.amount)
            .field("guid", &self.content.guid)
            .field("repetitions", &self.fragments.len())
            .field("signed", &self.signature.is_some())
            .finish_non_exhaustive()
    }
}
