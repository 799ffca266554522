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

//! Merchant-side coin acceptance.

use rand_core::CryptoRngCore;
use tracing::{debug, warn};

use crate::blind::{self, BankPublicKey};
use crate::coin::{Coin, CoinContent, CoinId};
use crate::commitment;
use crate::error::{Error, Result};
use crate::identity::Side;
use crate::params::Params;

/// One revealed half of one identity repetition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reveal {
    pub side: Side,
    pub secret: Vec<u8>,
}

/// What a merchant learns from accepting a coin, in repetition order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevealSet {
    pub guid: CoinId,
    pub reveals: Vec<Reveal>,
}

impl RevealSet {
    pub fn len(&self) -> usize {
        self.reveals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reveals.is_empty()
    }

    pub fn sides(&self) -> impl Iterator<Item = Side> + '_ {
        self.reveals.iter().map(|reveal| reveal.side)
    }

    pub fn secrets(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.reveals.iter().map(|reveal| reveal.secret.as_slice())
    }
}

/// A merchant that trusts one bank.
///
/// `accept` takes `&self` and keeps no state, so one merchant can serve
/// concurrent payers.
#[derive(Clone, Debug)]
pub struct Merchant {
    params: Params,
    bank: BankPublicKey,
}

impl Merchant {
    pub fn new(params: Params, bank: BankPublicKey) -> Self {
        Merchant { params, bank }
    }

    /// Checks the bank's signature on `coin` and collects one side of each
    /// identity repetition.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSignature`] if the coin is unsigned or the signature
    ///   does not verify over its serialized form
    /// - [`Error::MalformedCoin`] if the serialized form is not a coin of
    ///   this bank
    /// - [`Error::TamperedCoin`] if a revealed secret does not open its
    ///   commitment
    pub fn accept(&self, coin: &Coin, mut rng: impl CryptoRngCore) -> Result<RevealSet> {
        let signature = coin.signature().ok_or(Error::InvalidSignature)?;
        if !blind::verify(signature, coin.hashed().as_bytes(), &self.bank) {
            warn!(guid = %coin.guid(), "coin signature rejected");
            return Err(Error::InvalidSignature);
        }

        let content = CoinContent::parse(coin.hashed(), self.params.bank_tag())?;

        let mut reveals = Vec::with_capacity(content.repetitions());
        for (index, (left, right)) in content.left_hashes.iter().zip(&content.right_hashes).enumerate() {
            let side = Side::random(&mut rng);
            let committed = match side {
                Side::Left => left,
                Side::Right => right,
            };
            let secret = coin.reveal(index, side).ok_or(Error::TamperedCoin { index })?;
            if !commitment::verify(secret, committed) {
                warn!(guid = %content.guid, index, "revealed secret does not match commitment");
                return Err(Error::TamperedCoin { index });
            }
            reveals.push(Reveal {
                side,
                secret: secret.to_vec(),
            });
        }

        debug!(guid = %content.guid, amount = content.amount, "coin accepted");
        Ok(RevealSet {
            guid: content.guid,
            reveals,
        })
    }
}
