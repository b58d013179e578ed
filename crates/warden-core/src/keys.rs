//! Key material and public identities.
//!
//! Identities are BIP-340 x-only secp256k1 public keys. They travel as
//! lowercase hex inside protocol payloads and as bech32 `npub` strings
//! when shown to directory services.

use std::fmt;

use bech32::{Bech32, Hrp};
use k256::schnorr::{Signature, SigningKey, VerifyingKey};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{CoreError, Result};

const NPUB_HRP: Hrp = Hrp::parse_unchecked("npub");

/// A 32-byte x-only public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PublicKey(pub [u8; 32]);

impl PublicKey {
    /// Create from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| CoreError::InvalidPublicKey(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CoreError::InvalidPublicKey("expected 32 bytes".into()))?;
        let key = Self(arr);
        // Reject x coordinates that are not on the curve.
        key.to_point()?;
        Ok(key)
    }

    /// Encode as a bech32 `npub` string.
    pub fn to_npub(&self) -> String {
        bech32::encode::<Bech32>(NPUB_HRP, &self.0)
            .expect("32 bytes always fit in a bech32 string")
    }

    /// Decode a bech32 `npub` string.
    pub fn from_npub(s: &str) -> Result<Self> {
        let (hrp, data) =
            bech32::decode(s).map_err(|e| CoreError::InvalidPublicKey(e.to_string()))?;
        if hrp != NPUB_HRP {
            return Err(CoreError::InvalidPublicKey(format!(
                "unexpected prefix: {}",
                hrp
            )));
        }
        Self::from_hex(&hex::encode(data))
    }

    /// Parse either hex or `npub` form.
    pub fn parse(s: &str) -> Result<Self> {
        if s.starts_with("npub1") {
            Self::from_npub(s)
        } else {
            Self::from_hex(s)
        }
    }

    /// Verify a BIP-340 signature over a 32-byte digest.
    pub fn verify(&self, digest: &[u8; 32], signature: &SchnorrSignature) -> Result<()> {
        let verifying_key = VerifyingKey::from_bytes(&self.0)
            .map_err(|e| CoreError::InvalidPublicKey(e.to_string()))?;
        let sig = Signature::try_from(signature.0.as_slice())
            .map_err(|_| CoreError::InvalidSignature)?;
        verifying_key
            .verify_raw(digest, &sig)
            .map_err(|_| CoreError::InvalidSignature)
    }

    /// Lift to a full curve point (even y), as ECDH expects.
    pub(crate) fn to_point(&self) -> Result<k256::PublicKey> {
        let mut sec1 = [0u8; 33];
        sec1[0] = 0x02;
        sec1[1..].copy_from_slice(&self.0);
        k256::PublicKey::from_sec1_bytes(&sec1)
            .map_err(|_| CoreError::InvalidPublicKey("not a curve point".into()))
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for PublicKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A 64-byte BIP-340 Schnorr signature.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SchnorrSignature(pub [u8; 64]);

impl SchnorrSignature {
    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|_| CoreError::InvalidSignature)?;
        let arr: [u8; 64] = bytes.try_into().map_err(|_| CoreError::InvalidSignature)?;
        Ok(Self(arr))
    }
}

impl fmt::Debug for SchnorrSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchnorrSig({}...)", &self.to_hex()[..16])
    }
}

impl Serialize for SchnorrSignature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SchnorrSignature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A secp256k1 key pair.
///
/// Not `Serialize`, and `Debug` prints only the public half.
#[derive(Clone)]
pub struct Keys {
    secret: k256::SecretKey,
    signing_key: SigningKey,
    public: PublicKey,
}

impl Keys {
    /// Generate a new random key pair.
    pub fn generate() -> Self {
        let secret = k256::SecretKey::random(&mut rand::thread_rng());
        Self::from_secret(secret)
    }

    /// Create from 32 secret bytes.
    pub fn from_secret_bytes(bytes: &[u8; 32]) -> Result<Self> {
        let secret = k256::SecretKey::from_slice(bytes).map_err(|_| CoreError::InvalidSecretKey)?;
        Ok(Self::from_secret(secret))
    }

    /// Create from a hex-encoded secret.
    pub fn from_secret_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|_| CoreError::InvalidSecretKey)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CoreError::InvalidSecretKey)?;
        Self::from_secret_bytes(&arr)
    }

    fn from_secret(secret: k256::SecretKey) -> Self {
        let signing_key = SigningKey::from(secret.to_nonzero_scalar());
        let mut public = [0u8; 32];
        public.copy_from_slice(&signing_key.verifying_key().to_bytes());
        Self {
            secret,
            signing_key,
            public: PublicKey(public),
        }
    }

    /// Get the public identity.
    pub fn public_key(&self) -> PublicKey {
        self.public
    }

    /// Sign a 32-byte digest with fresh auxiliary randomness.
    pub fn sign(&self, digest: &[u8; 32]) -> Result<SchnorrSignature> {
        let aux: [u8; 32] = rand::random();
        let sig = self
            .signing_key
            .sign_raw(digest, &aux)
            .map_err(|_| CoreError::InvalidSignature)?;
        Ok(SchnorrSignature(sig.to_bytes()))
    }

    /// Raw ECDH x coordinate with a peer.
    pub(crate) fn ecdh_x(&self, peer: &PublicKey) -> Result<[u8; 32]> {
        let point = peer.to_point()?;
        let shared = k256::ecdh::diffie_hellman(self.secret.to_nonzero_scalar(), point.as_affine());
        let mut out = [0u8; 32];
        out.copy_from_slice(shared.raw_secret_bytes());
        Ok(out)
    }
}

impl fmt::Debug for Keys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keys({:?})", self.public)
    }
}
