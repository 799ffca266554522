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

//! Protocol parameters shared by the bank, payers and merchants.

use crate::coin::{FIELD_SEPARATOR, LIST_SEPARATOR};
use crate::error::{Error, Result};

/// Bank tag used when none is configured.
pub const DEFAULT_BANK_TAG: &str = "ECASH_BANK";

/// Identity repetitions per coin. A double spend escapes with probability
/// `2^-repetitions`.
pub const DEFAULT_REPETITIONS: usize = 16;

/// Candidates per cut-and-choose batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

pub const DEFAULT_KEY_BITS: usize = 2048;

/// Smallest modulus `BankKey::generate` will produce.
pub const MIN_KEY_BITS: usize = 512;

/// Deployment parameters.
///
/// All parties must agree on these. The bank tag is the first field of every
/// serialized coin and binds coins to the bank that issued them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Params {
    pub(crate) bank_tag: String,
    pub(crate) repetitions: usize,
    pub(crate) batch_size: usize,
    pub(crate) key_bits: usize,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            bank_tag: DEFAULT_BANK_TAG.to_owned(),
            repetitions: DEFAULT_REPETITIONS,
            batch_size: DEFAULT_BATCH_SIZE,
            key_bits: DEFAULT_KEY_BITS,
        }
    }
}

impl Params {
    /// Creates validated parameters with the default key size.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidParams`] if the bank tag is empty or contains a
    /// separator, if `repetitions` is zero, or if `batch_size` is below two.
    pub fn new(bank_tag: &str, repetitions: usize, batch_size: usize) -> Result<Self> {
        let params = Params {
            bank_tag: bank_tag.to_owned(),
            repetitions,
            batch_size,
            key_bits: DEFAULT_KEY_BITS,
        };
        params.validate()?;
        Ok(params)
    }

    pub fn with_bank_tag(mut self, bank_tag: &str) -> Result<Self> {
        self.bank_tag = bank_tag.to_owned();
        self.validate()?;
        Ok(self)
    }

    pub fn with_repetitions(mut self, repetitions: usize) -> Result<Self> {
        self.repetitions = repetitions;
        self.validate()?;
        Ok(self)
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self> {
        self.batch_size = batch_size;
        self.validate()?;
        Ok(self)
    }

    pub fn with_key_bits(mut self, key_bits: usize) -> Result<Self> {
        self.key_bits = key_bits;
        self.validate()?;
        Ok(self)
    }

    pub fn bank_tag(&self) -> &str {
        &self.bank_tag
    }

    pub fn repetitions(&self) -> usize {
        self.repetitions
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn key_bits(&self) -> usize {
        self.key_bits
    }

    fn validate(&self) -> Result<()> {
        if self.bank_tag.is_empty() {
            return Err(Error::InvalidParams("bank tag is empty".into()));
        }
        if self.bank_tag.contains([FIELD_SEPARATOR, LIST_SEPARATOR]) {
            return Err(Error::InvalidParams(format!(
                "bank tag {:?} contains a separator",
                self.bank_tag
            )));
        }
        if self.repetitions == 0 {
            return Err(Error::InvalidParams("at least one repetition is required".into()));
        }
        // A batch of one leaves nothing to open.
        if self.batch_size < 2 {
            return Err(Error::InvalidParams(format!(
                "batch size {} is below 2",
                self.batch_size
            )));
        }
        if self.key_bits < MIN_KEY_BITS {
            return Err(Error::InvalidParams(format!(
                "key size {} is below {MIN_KEY_BITS} bits",
                self.key_bits
            )));
        }
        Ok(())
    }
}
