//! Signed and optionally encrypted cookie values
//!
//! A cookie value is an envelope around the session ID:
//! `base64url(timestamp + "|" + base64url(value) + "|" + base64url(mac))`
//!
//! The MAC is HMAC-SHA256 over `name + "|" + timestamp + "|" + base64url(value)`,
//! so a value signed for one cookie name is rejected under any other name.
//! When a block key is configured the value is sealed with AES-GCM first,
//! using the cookie name as associated data.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use ring::aead::{self, Aad, LessSafeKey, Nonce, UnboundKey, NONCE_LEN};
use sha2::Sha256;
use std::fmt;

use crate::config::DEFAULT_MAX_AGE;
use crate::error::CookieError;

type HmacSha256 = Hmac<Sha256>;

/// Maximum length of an encoded cookie value, matching common browser limits
pub const MAX_LENGTH: usize = 4096;

/// Fill a new buffer of `length` bytes from a cryptographically secure source
pub fn generate_random_key(length: usize) -> Vec<u8> {
    let mut key = vec![0u8; length];
    rand::rng().fill_bytes(&mut key);
    key
}

/// Encodes and verifies cookie envelopes for one key pair
#[derive(Clone)]
pub struct CookieCodec {
    hash_key: Vec<u8>,
    block_key: Option<Vec<u8>>,
    max_age: i64,
    max_length: usize,
}

impl fmt::Debug for CookieCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieCodec")
            .field("encrypted", &self.block_key.is_some())
            .field("max_age", &self.max_age)
            .field("max_length", &self.max_length)
            .finish()
    }
}

impl CookieCodec {
    /// Create a codec from a hash key and an optional 16 or 32 byte block key
    pub fn new(hash_key: &[u8], block_key: Option<&[u8]>) -> Result<Self, CookieError> {
        if hash_key.is_empty() {
            return Err(CookieError::InvalidKey("hash key is not set".to_string()));
        }
        if let Some(key) = block_key {
            cipher(key)?;
        }
        Ok(Self {
            hash_key: hash_key.to_vec(),
            block_key: block_key.map(<[u8]>::to_vec),
            max_age: DEFAULT_MAX_AGE,
            max_length: MAX_LENGTH,
        })
    }

    /// Set the max age in seconds; envelopes older than this are rejected.
    /// Zero disables the check.
    pub fn with_max_age(mut self, max_age: i64) -> Self {
        self.set_max_age(max_age);
        self
    }

    /// Set the max age in seconds in place
    pub fn set_max_age(&mut self, max_age: i64) {
        self.max_age = max_age;
    }

    /// Current max age in seconds
    pub fn max_age(&self) -> i64 {
        self.max_age
    }

    /// Set the maximum encoded length. Zero disables the check.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Whether values are encrypted as well as signed
    pub fn is_encrypted(&self) -> bool {
        self.block_key.is_some()
    }

    /// Wrap `value` into an envelope for the cookie `name`
    pub fn encode(&self, name: &str, value: &str) -> Result<String, CookieError> {
        self.encode_at(name, value, Utc::now().timestamp())
    }

    pub(crate) fn encode_at(&self, name: &str, value: &str, timestamp: i64) -> Result<String, CookieError> {
        let raw = match &self.block_key {
            Some(key) => seal(key, name, value.as_bytes())?,
            None => value.as_bytes().to_vec(),
        };
        let value = URL_SAFE_NO_PAD.encode(raw);
        let timestamp = timestamp.to_string();
        let mac = self.mac(name, &timestamp, &value)?.finalize().into_bytes();

        let envelope = format!("{}|{}|{}", timestamp, value, URL_SAFE_NO_PAD.encode(mac));
        let encoded = URL_SAFE_NO_PAD.encode(envelope);
        if self.max_length != 0 && encoded.len() > self.max_length {
            return Err(CookieError::TooLong);
        }
        Ok(encoded)
    }

    /// Verify an envelope produced for the cookie `name` and return the wrapped value
    pub fn decode(&self, name: &str, encoded: &str) -> Result<String, CookieError> {
        if self.max_length != 0 && encoded.len() > self.max_length {
            return Err(CookieError::TooLong);
        }

        let envelope = URL_SAFE_NO_PAD
            .decode(encoded)
            .map_err(|e| CookieError::Decode(e.to_string()))?;
        let envelope = String::from_utf8(envelope)
            .map_err(|_| CookieError::Decode("envelope is not utf-8".to_string()))?;

        let mut parts = envelope.splitn(3, '|');
        let (Some(timestamp), Some(value), Some(mac)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(CookieError::Decode("invalid envelope".to_string()));
        };

        let mac = URL_SAFE_NO_PAD
            .decode(mac)
            .map_err(|e| CookieError::Decode(e.to_string()))?;
        self.mac(name, timestamp, value)?
            .verify_slice(&mac)
            .map_err(|_| CookieError::MacInvalid)?;

        let timestamp: i64 = timestamp
            .parse()
            .map_err(|_| CookieError::Decode("invalid timestamp".to_string()))?;
        if self.max_age > 0 && timestamp < Utc::now().timestamp() - self.max_age {
            return Err(CookieError::Expired);
        }

        let raw = URL_SAFE_NO_PAD
            .decode(value)
            .map_err(|e| CookieError::Decode(e.to_string()))?;
        let raw = match &self.block_key {
            Some(key) => open(key, name, raw)?,
            None => raw,
        };
        String::from_utf8(raw).map_err(|_| CookieError::Decode("value is not utf-8".to_string()))
    }

    fn mac(&self, name: &str, timestamp: &str, value: &str) -> Result<HmacSha256, CookieError> {
        let mut mac = HmacSha256::new_from_slice(&self.hash_key)
            .map_err(|e| CookieError::InvalidKey(e.to_string()))?;
        mac.update(name.as_bytes());
        mac.update(b"|");
        mac.update(timestamp.as_bytes());
        mac.update(b"|");
        mac.update(value.as_bytes());
        Ok(mac)
    }
}

fn cipher(block_key: &[u8]) -> Result<LessSafeKey, CookieError> {
    let algorithm = match block_key.len() {
        16 => &aead::AES_128_GCM,
        32 => &aead::AES_256_GCM,
        n => {
            return Err(CookieError::InvalidKey(format!(
                "block key must be 16 or 32 bytes, got {}",
                n
            )))
        }
    };
    let key = UnboundKey::new(algorithm, block_key)
        .map_err(|_| CookieError::InvalidKey("block key rejected".to_string()))?;
    Ok(LessSafeKey::new(key))
}

/// Output layout: nonce followed by ciphertext and tag
fn seal(block_key: &[u8], name: &str, plain: &[u8]) -> Result<Vec<u8>, CookieError> {
    let key = cipher(block_key)?;
    let mut nonce = [0u8; NONCE_LEN];
    rand::rng().fill_bytes(&mut nonce);

    let mut in_out = plain.to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce),
        Aad::from(name.as_bytes()),
        &mut in_out,
    )
    .map_err(|_| CookieError::Encrypt)?;

    let mut sealed = nonce.to_vec();
    sealed.extend_from_slice(&in_out);
    Ok(sealed)
}

fn open(block_key: &[u8], name: &str, mut sealed: Vec<u8>) -> Result<Vec<u8>, CookieError> {
    if sealed.len() < NONCE_LEN {
        return Err(CookieError::Decrypt);
    }
    let key = cipher(block_key)?;
    let mut in_out = sealed.split_off(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(&sealed).map_err(|_| CookieError::Decrypt)?;
    let plain = key
        .open_in_place(nonce, Aad::from(name.as_bytes()), &mut in_out)
        .map_err(|_| CookieError::Decrypt)?;
    Ok(plain.to_vec())
}

/// Ordered set of codecs supporting key rotation.
///
/// The first codec encodes; every codec is tried in order when decoding.
#[derive(Clone, Debug, Default)]
pub struct CookieCodecs(Vec<CookieCodec>);

impl CookieCodecs {
    /// Wrap an explicit list of codecs
    pub fn new(codecs: Vec<CookieCodec>) -> Self {
        Self(codecs)
    }

    /// Build codecs from a flat list of keys: `[hash1, block1, hash2, block2, ...]`.
    ///
    /// A trailing hash key without a block key, or an empty block key,
    /// produces a signing-only codec.
    pub fn from_pairs(key_pairs: &[&[u8]]) -> Result<Self, CookieError> {
        if key_pairs.is_empty() {
            return Err(CookieError::NoCodecs);
        }
        let codecs = key_pairs
            .chunks(2)
            .map(|pair| {
                let block_key = pair.get(1).copied().filter(|key| !key.is_empty());
                CookieCodec::new(pair[0], block_key)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self(codecs))
    }

    /// Encode with the first codec
    pub fn encode(&self, name: &str, value: &str) -> Result<String, CookieError> {
        self.0
            .first()
            .ok_or(CookieError::NoCodecs)?
            .encode(name, value)
    }

    /// Decode with the first codec that accepts the envelope.
    ///
    /// When none does, the first codec's error is returned.
    pub fn decode(&self, name: &str, encoded: &str) -> Result<String, CookieError> {
        let mut first_error = None;
        for codec in &self.0 {
            match codec.decode(name, encoded) {
                Ok(value) => return Ok(value),
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        Err(first_error.unwrap_or(CookieError::NoCodecs))
    }

    /// Set the max age of every codec
    pub fn set_max_age(&mut self, max_age: i64) {
        for codec in &mut self.0 {
            codec.set_max_age(max_age);
        }
    }

    /// Number of codecs
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no codec is configured
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
