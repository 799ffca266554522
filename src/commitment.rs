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

//! Hash commitments for identity fragments.
//!
//! This module seals each half of an identity repetition behind a BLAKE3
//! digest. Commitments are deterministic, so anyone holding a revealed secret
//! can recompute the digest and compare it with the one printed in the coin.

use std::fmt;
use std::str::FromStr;

use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

const COMMITMENT_CONTEXT: &str = "blind-ecash 2025 identity fragment commitment v1";

/// Length in bytes of a commitment digest.
pub const DIGEST_LEN: usize = 32;

/// A commitment to one identity fragment.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Digest(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

impl FromStr for Digest {
    type Err = Error;

    /// Parses exactly 64 lowercase or uppercase hex characters.
    fn from_str(s: &str) -> Result<Self> {
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| Error::MalformedCoin(format!("bad commitment {s:?}: {e}")))?;
        Ok(Digest(bytes))
    }
}

/// Commits to a secret.
///
/// # Arguments
///
/// * `secret` - The fragment bytes to seal
///
/// # Returns
///
/// The BLAKE3 digest of `secret` under this module's context string
pub fn commit(secret: &[u8]) -> Digest {
    let mut hasher = blake3::Hasher::new_derive_key(COMMITMENT_CONTEXT);
    hasher.update(secret);
    Digest(*hasher.finalize().as_bytes())
}

/// Checks that `secret` opens `digest`.
///
/// The comparison runs in constant time. A `false` result is a protocol
/// violation that the caller has to report.
pub fn verify(secret: &[u8], digest: &Digest) -> bool {
    commit(secret).0.ct_eq(&digest.0).into()
}
