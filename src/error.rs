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

use thiserror::Error;

use crate::cbor::CborError;

/// Specialisation of `std::Result`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every way a protocol step can refuse to continue.
///
/// Detection outcomes are not errors; see [`crate::Outcome`].
#[derive(Error, Debug)]
pub enum Error {
    /// The signature does not verify against the bank's public key, or the
    /// coin carries no signature at all.
    #[error("coin signature does not verify against the bank key")]
    InvalidSignature,

    /// The serialized coin has the wrong bank tag or violates the schema.
    #[error("malformed coin: {0}")]
    MalformedCoin(String),

    /// A revealed identity secret does not hash to the committed value.
    #[error("revealed secret for repetition {index} does not match its commitment")]
    TamperedCoin { index: usize },

    /// An opened cut-and-choose candidate did not check out. The whole batch
    /// is refused.
    #[error("batch verification failed: {0}")]
    BatchVerificationFailed(String),

    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// Unblinding was requested on a coin that was never blinded.
    #[error("coin has not been blinded")]
    NotBlinded,

    #[error("bank key generation failed: {0}")]
    KeyGeneration(#[from] rsa::Error),
}

impl From<CborError> for Error {
    fn from(e: CborError) -> Self {
        Self::MalformedCoin(e.to_string())
    }
}
