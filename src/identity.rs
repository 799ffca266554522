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

//! Split identity commitments.
//!
//! Each coin carries `k` repetitions of the payer's identity, every one split
//! into a left and a right secret whose XOR is `IDENT_MARKER || owner`. One
//! side on its own is a uniformly random string. Both sides of the same
//! repetition give the owner away.

use std::fmt;

use rand_core::CryptoRngCore;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::commitment::{self, Digest};

/// Prefix that marks a recovered XOR as a genuine identity.
pub const IDENT_MARKER: &[u8] = b"IDENT:";

/// Which half of a repetition a merchant asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    /// Draws a side with one fair bit from `rng`.
    pub fn random(mut rng: impl CryptoRngCore) -> Self {
        if rng.next_u32() & 1 == 0 {
            Side::Left
        } else {
            Side::Right
        }
    }
}

/// The two secrets of one repetition.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct IdentityFragment {
    pub(crate) left: Vec<u8>,
    pub(crate) right: Vec<u8>,
}

impl IdentityFragment {
    pub fn secret(&self, side: Side) -> &[u8] {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }
}

impl fmt::Debug for IdentityFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IdentityFragment(..)")
    }
}

/// Output of [`build`]: the secrets and their public commitments.
pub struct IdentityCommitments {
    pub fragments: Vec<IdentityFragment>,
    pub left_hashes: Vec<Digest>,
    pub right_hashes: Vec<Digest>,
}

/// Splits `owner` into `repetitions` committed left/right pairs.
///
/// For every repetition a fresh `a` is drawn uniformly at the length of
/// `IDENT_MARKER || owner` and `b = a XOR (IDENT_MARKER || owner)`.
pub fn build(owner: &str, repetitions: usize, mut rng: impl CryptoRngCore) -> IdentityCommitments {
    let mut tagged = tagged_identity(owner);

    let mut fragments = Vec::with_capacity(repetitions);
    let mut left_hashes = Vec::with_capacity(repetitions);
    let mut right_hashes = Vec::with_capacity(repetitions);

    for _ in 0..repetitions {
        let mut left = vec![0u8; tagged.len()];
        rng.fill_bytes(&mut left);
        let right = xor(&left, &tagged);

        left_hashes.push(commitment::commit(&left));
        right_hashes.push(commitment::commit(&right));
        fragments.push(IdentityFragment { left, right });
    }
    tagged.zeroize();

    IdentityCommitments {
        fragments,
        left_hashes,
        right_hashes,
    }
}

/// Finds the first repetition that does not encode `owner`.
///
/// A repetition is well formed when both secrets open their commitments and
/// XOR to `IDENT_MARKER || owner`. Differing counts of fragments and hashes
/// make the first unmatched index malformed.
pub fn find_malformed(
    owner: &str,
    fragments: &[IdentityFragment],
    left_hashes: &[Digest],
    right_hashes: &[Digest],
) -> Option<usize> {
    let mut tagged = tagged_identity(owner);
    let count = fragments.len().max(left_hashes.len()).max(right_hashes.len());
    let malformed = (0..count).find(|&index| {
        let (Some(fragment), Some(left_hash), Some(right_hash)) =
            (fragments.get(index), left_hashes.get(index), right_hashes.get(index))
        else {
            return true;
        };
        fragment.left.len() != tagged.len()
            || fragment.right.len() != tagged.len()
            || !commitment::verify(&fragment.left, left_hash)
            || !commitment::verify(&fragment.right, right_hash)
            || xor(&fragment.left, &fragment.right) != tagged
    });
    tagged.zeroize();
    malformed
}

fn tagged_identity(owner: &str) -> Vec<u8> {
    let mut tagged = Vec::with_capacity(IDENT_MARKER.len() + owner.len());
    tagged.extend_from_slice(IDENT_MARKER);
    tagged.extend_from_slice(owner.as_bytes());
    tagged
}

/// Byte-wise XOR of two equally long strings.
pub(crate) fn xor(a: &[u8], b: &[u8]) -> Vec<u8> {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b).map(|(x, y)| x ^ y).collect()
}

/// Combines two different reveals of one repetition into an identity.
///
/// Returns `None` if the lengths differ, the marker is missing, or the
/// remainder is not UTF-8.
pub fn recover(a: &[u8], b: &[u8]) -> Option<String> {
    if a.len() != b.len() {
        return None;
    }
    let combined = xor(a, b);
    let owner = combined.strip_prefix(IDENT_MARKER)?;
    String::from_utf8(owner.to_vec()).ok()
}
