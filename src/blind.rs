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

//! RSA blind signatures.
//!
//! Textbook multiplicative blinding over a full-domain message
//! representative:
//!
//! ```text
//! m  = FDH(message)            (len(N) - 1 bytes of BLAKE3 XOF output)
//! m' = m * r^e mod N           blind
//! s' = m'^d mod N              sign
//! s  = s' * r^-1 mod N         unblind
//! s^e mod N == m               verify
//! ```
//!
//! Key generation is delegated to the `rsa` crate; everything after that
//! works on the raw `(n, e, d)` integers.

use std::fmt;

use num_bigint::BigUint;
use rand_core::CryptoRngCore;
use rsa::RsaPrivateKey;
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use zeroize::Zeroize;

use crate::error::{Error, Result};

const FDH_CONTEXT: &str = "blind-ecash 2025 rsa full-domain hash v1";

/// The bank's verification key.
#[derive(Clone, PartialEq, Eq)]
pub struct BankPublicKey {
    pub(crate) n: BigUint,
    pub(crate) e: BigUint,
}

impl BankPublicKey {
    /// Builds a public key from big-endian modulus and exponent bytes.
    pub fn from_be_bytes(n: &[u8], e: &[u8]) -> Result<Self> {
        let key = BankPublicKey {
            n: BigUint::from_bytes_be(n),
            e: BigUint::from_bytes_be(e),
        };
        key.check()?;
        Ok(key)
    }

    pub fn modulus(&self) -> &BigUint {
        &self.n
    }

    pub fn exponent(&self) -> &BigUint {
        &self.e
    }

    /// Modulus length in bytes.
    pub fn modulus_len(&self) -> usize {
        self.n.bits().div_ceil(8) as usize
    }

    fn check(&self) -> Result<()> {
        if self.n.bits() < 64 {
            return Err(Error::InvalidParams("RSA modulus is too small".into()));
        }
        if self.e < BigUint::from(3u32) || self.e >= self.n {
            return Err(Error::InvalidParams("RSA exponent out of range".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for BankPublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BankPublicKey")
            .field("bits", &self.n.bits())
            .field("e", &self.e)
            .finish()
    }
}

/// The bank's signing key.
#[derive(Clone)]
pub struct BankKey {
    d: BigUint,
    public: BankPublicKey,
}

impl BankKey {
    /// Generates a fresh key pair with a modulus of `bits` bits.
    pub fn generate(bits: usize, mut rng: impl CryptoRngCore) -> Result<Self> {
        let key = RsaPrivateKey::new(&mut rng, bits)?;
        Self::from_components(
            &key.n().to_bytes_be(),
            &key.e().to_bytes_be(),
            &key.d().to_bytes_be(),
        )
    }

    /// Wraps an externally generated key given as big-endian integers.
    pub fn from_components(n: &[u8], e: &[u8], d: &[u8]) -> Result<Self> {
        let public = BankPublicKey::from_be_bytes(n, e)?;
        let d = BigUint::from_bytes_be(d);
        if d >= public.n || d.bits() == 0 {
            return Err(Error::InvalidParams("RSA private exponent out of range".into()));
        }
        Ok(BankKey { d, public })
    }

    pub fn public(&self) -> &BankPublicKey {
        &self.public
    }
}

impl fmt::Debug for BankKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BankKey")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// A message hidden by a blinding factor, as the bank sees it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlindedMessage(pub(crate) BigUint);

/// The payer's secret `r`.
#[derive(Clone, PartialEq, Eq)]
pub struct BlindingFactor(pub(crate) BigUint);

impl fmt::Debug for BlindingFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BlindingFactor(..)")
    }
}

impl Drop for BlindingFactor {
    fn drop(&mut self) {
        wipe(&mut self.0);
    }
}

/// Clears every bit of `value` in place, lowest first.
///
/// Each limb is zeroed before normalization can drop it, so the buffer
/// holds no trace of the old value. Temporaries derived from it during
/// arithmetic are not covered.
fn wipe(value: &mut BigUint) {
    for bit in 0..value.bits() {
        value.set_bit(bit, false);
    }
}

/// The bank's signature over a [`BlindedMessage`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlindSignature(pub(crate) BigUint);

/// A signature over the plain message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature(pub(crate) BigUint);

impl Signature {
    pub fn to_be_bytes(&self) -> Vec<u8> {
        self.0.to_bytes_be()
    }

    pub fn from_be_bytes(bytes: &[u8]) -> Self {
        Signature(BigUint::from_bytes_be(bytes))
    }
}

impl BlindedMessage {
    pub fn to_be_bytes(&self) -> Vec<u8> {
        self.0.to_bytes_be()
    }
}

impl BlindSignature {
    pub fn to_be_bytes(&self) -> Vec<u8> {
        self.0.to_bytes_be()
    }
}

/// Maps a message onto `[0, 2^(8(len(N)-1)))`, which lies below `N`.
fn message_representative(message: &[u8], public: &BankPublicKey) -> BigUint {
    let mut out = vec![0u8; public.modulus_len() - 1];
    let mut hasher = blake3::Hasher::new_derive_key(FDH_CONTEXT);
    hasher.update(message);
    hasher.finalize_xof().fill(&mut out);
    BigUint::from_bytes_be(&out)
}

/// Draws a blinding factor invertible modulo `N`.
fn random_factor(public: &BankPublicKey, rng: &mut impl CryptoRngCore) -> BigUint {
    let one = BigUint::from(1u32);
    let mut bytes = vec![0u8; public.modulus_len()];
    loop {
        rng.fill_bytes(&mut bytes);
        let r = BigUint::from_bytes_be(&bytes);
        if r <= one || r >= public.n {
            continue;
        }
        if r.modinv(&public.n).is_some() {
            bytes.zeroize();
            return r;
        }
    }
}

/// Blinds `message` for signing under `public`.
pub fn blind(
    message: &[u8],
    public: &BankPublicKey,
    mut rng: impl CryptoRngCore,
) -> (BlindedMessage, BlindingFactor) {
    let factor = BlindingFactor(random_factor(public, &mut rng));
    let blinded = blind_with(message, &factor, public);
    (blinded, factor)
}

/// Recomputes the blinded form of `message` under a known factor.
///
/// The bank uses this to check opened cut-and-choose candidates.
pub fn blind_with(message: &[u8], factor: &BlindingFactor, public: &BankPublicKey) -> BlindedMessage {
    let m = message_representative(message, public);
    let r_e = factor.0.modpow(&public.e, &public.n);
    BlindedMessage((m * r_e) % &public.n)
}

/// Signs a blinded message. The signer learns nothing about the message.
pub fn sign(blinded: &BlindedMessage, key: &BankKey) -> BlindSignature {
    BlindSignature(blinded.0.modpow(&key.d, &key.public.n))
}

/// Strips the blinding factor from a blind signature.
pub fn unblind(
    blind_signature: &BlindSignature,
    factor: &BlindingFactor,
    public: &BankPublicKey,
) -> Result<Signature> {
    let r_inv = factor
        .0
        .modinv(&public.n)
        .ok_or_else(|| Error::InvalidParams("blinding factor is not invertible".into()))?;
    Ok(Signature((&blind_signature.0 * r_inv) % &public.n))
}

/// Checks `signature` over `message`.
pub fn verify(signature: &Signature, message: &[u8], public: &BankPublicKey) -> bool {
    if signature.0 >= public.n {
        return false;
    }
    signature.0.modpow(&public.e, &public.n) == message_representative(message, public)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::test_key;
    use rand_core::OsRng;

    #[test]
    fn blind_sign_unblind_verifies() {
        let key = test_key();
        let message = b"The bearer of this signed document has full diplomatic immunity.";
        let (blinded, factor) = blind(message, key.public(), OsRng);
        let blind_signature = sign(&blinded, key);
        let signature = unblind(&blind_signature, &factor, key.public()).unwrap();
        assert!(verify(&signature, message, key.public()));
        assert!(!verify(&signature, b"another document", key.public()));
    }

    #[test]
    fn blinded_values_are_unlinkable() {
        let key = test_key();
        let (first, _) = blind(b"same", key.public(), OsRng);
        let (second, _) = blind(b"same", key.public(), OsRng);
        assert_ne!(first, second);
    }

    #[test]
    fn blind_with_reproduces_blind() {
        let key = test_key();
        let (blinded, factor) = blind(b"coin", key.public(), OsRng);
        assert_eq!(blind_with(b"coin", &factor, key.public()), blinded);
        assert_ne!(blind_with(b"coiN", &factor, key.public()), blinded);
    }

    #[test]
    fn signature_on_blinded_value_is_not_valid_on_message() {
        let key = test_key();
        let (blinded, _) = blind(b"coin", key.public(), OsRng);
        let raw = sign(&blinded, key);
        assert!(!verify(&Signature(raw.0), b"coin", key.public()));
    }

    #[test]
    fn oversized_signature_is_rejected() {
        let key = test_key();
        let forged = Signature(key.public().n.clone());
        assert!(!verify(&forged, b"coin", key.public()));
    }

    #[test]
    fn wipe_clears_the_value() {
        let key = test_key();
        let (_, factor) = blind(b"coin", key.public(), OsRng);
        let mut value = factor.0.clone();
        assert!(value.bits() > 0);
        wipe(&mut value);
        assert_eq!(value, BigUint::from(0u32));
    }

    #[test]
    fn external_components_round_trip() {
        let key = test_key();
        let public = BankPublicKey::from_be_bytes(
            &key.public().n.to_bytes_be(),
            &key.public().e.to_bytes_be(),
        )
        .unwrap();
        assert_eq!(&public, key.public());
        assert!(BankPublicKey::from_be_bytes(&[0x0f], &[3]).is_err());
    }
}
