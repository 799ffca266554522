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

//! CBOR serialization for values that leave a party.
//!
//! Reveal sets travel from merchants to the bank and are what a spend ledger
//! stores; the bank's public key and coin signatures travel to merchants.
//! All messages are CBOR maps with small integer keys, written in key order.

use std::collections::BTreeSet;
use std::fmt;

use ciborium::value::Value;

use crate::blind::{BankPublicKey, Signature};
use crate::coin::{COIN_ID_LEN, CoinId};
use crate::identity::Side;
use crate::merchant::{Reveal, RevealSet};

/// Error type for CBOR serialization/deserialization
#[derive(Debug)]
pub enum CborError {
    /// Error from ciborium library
    Ciborium(ciborium::de::Error<std::io::Error>),
    /// Invalid CBOR structure
    InvalidStructure(&'static str),
    /// Invalid field value
    InvalidValue(&'static str),
}

impl fmt::Display for CborError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CborError::Ciborium(e) => write!(f, "cbor decoding failed: {e}"),
            CborError::InvalidStructure(what) => write!(f, "invalid cbor structure: {what}"),
            CborError::InvalidValue(what) => write!(f, "invalid cbor value: {what}"),
        }
    }
}

impl std::error::Error for CborError {}

impl From<ciborium::de::Error<std::io::Error>> for CborError {
    fn from(e: ciborium::de::Error<std::io::Error>) -> Self {
        CborError::Ciborium(e)
    }
}

impl From<ciborium::ser::Error<std::io::Error>> for CborError {
    fn from(_: ciborium::ser::Error<std::io::Error>) -> Self {
        CborError::InvalidStructure("serialization error")
    }
}

fn key(i: u8) -> Value {
    Value::Integer(i.into())
}

fn write(map: Vec<(Value, Value)>) -> Result<Vec<u8>, CborError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(&Value::Map(map), &mut bytes)?;
    Ok(bytes)
}

/// Reads a map and hands back its entries keyed by small integers.
///
/// A key that appears twice is an error.
fn read(bytes: &[u8]) -> Result<Vec<(u8, Value)>, CborError> {
    let value: Value = ciborium::from_reader(bytes)?;
    let Value::Map(map) = value else {
        return Err(CborError::InvalidStructure("expected CBOR map"));
    };
    let mut seen = BTreeSet::new();
    let mut entries = Vec::with_capacity(map.len());
    for (k, v) in map {
        let Value::Integer(i) = k else {
            return Err(CborError::InvalidStructure("expected integer map key"));
        };
        let i = u8::try_from(i).map_err(|_| CborError::InvalidStructure("map key out of range"))?;
        if !seen.insert(i) {
            return Err(CborError::InvalidStructure("duplicate map key"));
        }
        entries.push((i, v));
    }
    Ok(entries)
}

fn decode_bytes(value: Value, what: &'static str) -> Result<Vec<u8>, CborError> {
    match value {
        Value::Bytes(bytes) => Ok(bytes),
        _ => Err(CborError::InvalidStructure(what)),
    }
}

fn encode_side(side: Side) -> Value {
    match side {
        Side::Left => Value::Integer(0.into()),
        Side::Right => Value::Integer(1.into()),
    }
}

fn decode_side(value: &Value) -> Result<Side, CborError> {
    match value {
        Value::Integer(i) if *i == 0.into() => Ok(Side::Left),
        Value::Integer(i) if *i == 1.into() => Ok(Side::Right),
        _ => Err(CborError::InvalidValue("side must be 0 or 1")),
    }
}

/// CBOR encoding for RevealSet
impl RevealSet {
    /// Encode to CBOR:
    /// ```text
    /// RevealSetMsg = {
    ///     1: bstr,               ; guid (16 bytes)
    ///     2: [* [uint, bstr]]    ; (side, secret) per repetition, 0 = left
    /// }
    /// ```
    pub fn to_cbor(&self) -> Result<Vec<u8>, CborError> {
        let reveals = self
            .reveals
            .iter()
            .map(|reveal| {
                Value::Array(vec![
                    encode_side(reveal.side),
                    Value::Bytes(reveal.secret.clone()),
                ])
            })
            .collect();
        write(vec![
            (key(1), Value::Bytes(self.guid.as_bytes().to_vec())),
            (key(2), Value::Array(reveals)),
        ])
    }

    /// Decode from CBOR
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CborError> {
        let mut guid = None;
        let mut reveals = None;

        for (k, v) in read(bytes)? {
            match k {
                1 => {
                    let raw = decode_bytes(v, "expected byte string for guid")?;
                    let raw: [u8; COIN_ID_LEN] = raw
                        .try_into()
                        .map_err(|_| CborError::InvalidValue("guid must be 16 bytes"))?;
                    guid = Some(CoinId::from(raw));
                }
                2 => {
                    let Value::Array(items) = v else {
                        return Err(CborError::InvalidStructure("expected array of reveals"));
                    };
                    let mut decoded = Vec::with_capacity(items.len());
                    for item in items {
                        let Value::Array(pair) = item else {
                            return Err(CborError::InvalidStructure("expected reveal pair"));
                        };
                        let [side, secret]: [Value; 2] = pair
                            .try_into()
                            .map_err(|_| CborError::InvalidStructure("reveal pair wrong size"))?;
                        decoded.push(Reveal {
                            side: decode_side(&side)?,
                            secret: decode_bytes(secret, "expected byte string for secret")?,
                        });
                    }
                    reveals = Some(decoded);
                }
                _ => {}
            }
        }

        Ok(RevealSet {
            guid: guid.ok_or(CborError::InvalidStructure("missing field 1 (guid)"))?,
            reveals: reveals.ok_or(CborError::InvalidStructure("missing field 2 (reveals)"))?,
        })
    }
}

/// CBOR encoding for BankPublicKey
impl BankPublicKey {
    /// Encode to CBOR:
    /// ```text
    /// BankPublicKeyMsg = {
    ///     1: bstr,  ; n (big-endian)
    ///     2: bstr   ; e (big-endian)
    /// }
    /// ```
    pub fn to_cbor(&self) -> Result<Vec<u8>, CborError> {
        write(vec![
            (key(1), Value::Bytes(self.n.to_bytes_be())),
            (key(2), Value::Bytes(self.e.to_bytes_be())),
        ])
    }

    /// Decode from CBOR
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CborError> {
        let mut n = None;
        let mut e = None;
        for (k, v) in read(bytes)? {
            match k {
                1 => n = Some(decode_bytes(v, "expected byte string for n")?),
                2 => e = Some(decode_bytes(v, "expected byte string for e")?),
                _ => {}
            }
        }
        let n = n.ok_or(CborError::InvalidStructure("missing field 1 (n)"))?;
        let e = e.ok_or(CborError::InvalidStructure("missing field 2 (e)"))?;
        BankPublicKey::from_be_bytes(&n, &e).map_err(|_| CborError::InvalidValue("invalid RSA public key"))
    }
}

/// CBOR encoding for Signature
impl Signature {
    /// Encode to CBOR:
    /// ```text
    /// SignatureMsg = {
    ///     1: bstr   ; s (big-endian)
    /// }
    /// ```
    pub fn to_cbor(&self) -> Result<Vec<u8>, CborError> {
        write(vec![(key(1), Value::Bytes(self.to_be_bytes()))])
    }

    /// Decode from CBOR
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, CborError> {
        let mut s = None;
        for (k, v) in read(bytes)? {
            if k == 1 {
                s = Some(decode_bytes(v, "expected byte string for signature")?);
            }
        }
        let s = s.ok_or(CborError::InvalidStructure("missing field 1 (s)"))?;
        Ok(Signature::from_be_bytes(&s))
    }
}
