//! Versioned envelope (version 2).
//!
//! Conversation key: HKDF-extract(SHA-256, salt = "nip44-v2", ikm = ECDH x).
//! Per message: a random 32-byte nonce expands (HKDF, info = nonce) into a
//! ChaCha20 key, ChaCha20 nonce and HMAC key. The plaintext is length
//! prefixed and padded before encryption, and the MAC covers
//! nonce || ciphertext.
//!
//! Payload: `base64(0x02 || nonce || ciphertext || mac)`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chacha20::cipher::{KeyIvInit, StreamCipher};
use chacha20::ChaCha20;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

use crate::error::{CoreError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Version byte.
pub const VERSION: u8 = 2;

const SALT: &[u8] = b"nip44-v2";
const MIN_PLAINTEXT_LEN: usize = 1;
const MAX_PLAINTEXT_LEN: usize = 65535;
const MIN_PAYLOAD_LEN: usize = 132;
const MAX_PAYLOAD_LEN: usize = 87472;
const MIN_DECODED_LEN: usize = 99;
const MAX_DECODED_LEN: usize = 65603;

/// Derive the conversation key from a raw ECDH x coordinate.
pub fn conversation_key(shared_x: &[u8; 32]) -> [u8; 32] {
    let (prk, _) = Hkdf::<Sha256>::extract(Some(SALT), shared_x);
    prk.into()
}

/// Padded length for a plaintext of `len` bytes (excluding the length prefix).
pub fn calc_padded_len(len: usize) -> usize {
    if len <= 32 {
        return 32;
    }
    let next_power = 1usize << (usize::BITS - (len - 1).leading_zeros());
    let chunk = if next_power <= 256 { 32 } else { next_power / 8 };
    chunk * ((len - 1) / chunk + 1)
}

struct MessageKeys {
    chacha_key: [u8; 32],
    chacha_nonce: [u8; 12],
    hmac_key: [u8; 32],
}

fn message_keys(conversation_key: &[u8; 32], nonce: &[u8; 32]) -> Result<MessageKeys> {
    let hk = Hkdf::<Sha256>::from_prk(conversation_key)
        .map_err(|e| CoreError::Encryption(e.to_string()))?;
    let mut okm = [0u8; 76];
    hk.expand(nonce, &mut okm)
        .map_err(|e| CoreError::Encryption(e.to_string()))?;

    let mut keys = MessageKeys {
        chacha_key: [0; 32],
        chacha_nonce: [0; 12],
        hmac_key: [0; 32],
    };
    keys.chacha_key.copy_from_slice(&okm[..32]);
    keys.chacha_nonce.copy_from_slice(&okm[32..44]);
    keys.hmac_key.copy_from_slice(&okm[44..]);
    Ok(keys)
}

fn pad(plaintext: &str) -> Result<Vec<u8>> {
    let bytes = plaintext.as_bytes();
    if bytes.len() < MIN_PLAINTEXT_LEN || bytes.len() > MAX_PLAINTEXT_LEN {
        return Err(CoreError::Encryption(format!(
            "plaintext length {} out of range",
            bytes.len()
        )));
    }
    let mut padded = Vec::with_capacity(2 + calc_padded_len(bytes.len()));
    padded.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    padded.extend_from_slice(bytes);
    padded.resize(2 + calc_padded_len(bytes.len()), 0);
    Ok(padded)
}

fn unpad(padded: &[u8]) -> Result<String> {
    if padded.len() < 2 {
        return Err(CoreError::Decryption("invalid padding".into()));
    }
    let len = u16::from_be_bytes([padded[0], padded[1]]) as usize;
    if len < MIN_PLAINTEXT_LEN || padded.len() != 2 + calc_padded_len(len) {
        return Err(CoreError::Decryption("invalid padding".into()));
    }
    String::from_utf8(padded[2..2 + len].to_vec())
        .map_err(|_| CoreError::Decryption("invalid utf-8".into()))
}

fn hmac_aad(key: &[u8; 32], nonce: &[u8; 32], ciphertext: &[u8]) -> Result<HmacSha256> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| CoreError::Encryption(e.to_string()))?;
    mac.update(nonce);
    mac.update(ciphertext);
    Ok(mac)
}

/// Encrypt with a fresh random nonce.
pub fn encrypt(conversation_key: &[u8; 32], plaintext: &str) -> Result<String> {
    let mut nonce = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut nonce);
    encrypt_with_nonce(conversation_key, plaintext, &nonce)
}

/// Encrypt with a caller-supplied nonce.
pub fn encrypt_with_nonce(
    conversation_key: &[u8; 32],
    plaintext: &str,
    nonce: &[u8; 32],
) -> Result<String> {
    let keys = message_keys(conversation_key, nonce)?;
    let mut buf = pad(plaintext)?;

    let mut cipher = ChaCha20::new(&keys.chacha_key.into(), &keys.chacha_nonce.into());
    cipher.apply_keystream(&mut buf);

    let mac = hmac_aad(&keys.hmac_key, nonce, &buf)?.finalize().into_bytes();

    let mut payload = Vec::with_capacity(1 + 32 + buf.len() + 32);
    payload.push(VERSION);
    payload.extend_from_slice(nonce);
    payload.extend_from_slice(&buf);
    payload.extend_from_slice(&mac);
    Ok(STANDARD.encode(payload))
}

/// Decrypt a version 2 payload.
pub fn decrypt(conversation_key: &[u8; 32], payload: &str) -> Result<String> {
    if payload.is_empty() || payload.starts_with('#') {
        return Err(CoreError::Decode("unsupported encryption version".into()));
    }
    if payload.len() < MIN_PAYLOAD_LEN || payload.len() > MAX_PAYLOAD_LEN {
        return Err(CoreError::Decode(format!(
            "invalid payload length: {}",
            payload.len()
        )));
    }

    let data = STANDARD
        .decode(payload)
        .map_err(|e| CoreError::Decode(e.to_string()))?;
    if data.len() < MIN_DECODED_LEN || data.len() > MAX_DECODED_LEN {
        return Err(CoreError::Decode(format!(
            "invalid data length: {}",
            data.len()
        )));
    }
    if data[0] != VERSION {
        return Err(CoreError::Decode(format!(
            "unknown version: {}",
            data[0]
        )));
    }

    let mut nonce = [0u8; 32];
    nonce.copy_from_slice(&data[1..33]);
    let mac_start = data.len() - 32;
    let ciphertext = &data[33..mac_start];
    let mac = &data[mac_start..];

    let keys = message_keys(conversation_key, &nonce)?;
    hmac_aad(&keys.hmac_key, &nonce, ciphertext)?
        .verify_slice(mac)
        .map_err(|_| CoreError::Decryption("invalid MAC".into()))?;

    let mut buf = ciphertext.to_vec();
    let mut cipher = ChaCha20::new(&keys.chacha_key.into(), &keys.chacha_nonce.into());
    cipher.apply_keystream(&mut buf);

    unpad(&buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_padded_lengths() {
        let table = [
            (16, 32),
            (32, 32),
            (33, 64),
            (37, 64),
            (45, 64),
            (49, 64),
            (64, 64),
            (65, 96),
            (100, 128),
            (111, 128),
            (200, 224),
            (250, 256),
            (320, 320),
            (383, 384),
            (384, 384),
            (400, 448),
            (500, 512),
            (512, 512),
            (515, 640),
            (700, 768),
            (800, 896),
            (900, 1024),
            (1020, 1024),
            (65536, 65536),
        ];
        for (len, expected) in table {
            assert_eq!(calc_padded_len(len), expected, "len {}", len);
        }
    }

    #[test]
    fn test_roundtrip() {
        let key = conversation_key(&[3; 32]);
        let payload = encrypt(&key, "a").unwrap();
        assert_eq!(decrypt(&key, &payload).unwrap(), "a");
    }

    #[test]
    fn test_payload_layout() {
        let key = conversation_key(&[3; 32]);
        let payload = encrypt_with_nonce(&key, "hi", &[1; 32]).unwrap();
        let data = STANDARD.decode(&payload).unwrap();
        // version + nonce + (2 + 32) padded + mac
        assert_eq!(data.len(), 1 + 32 + 34 + 32);
        assert_eq!(data[0], VERSION);
        assert_eq!(&data[1..33], &[1u8; 32]);
    }

    #[test]
    fn test_tampered_mac_rejected() {
        let key = conversation_key(&[3; 32]);
        let payload = encrypt(&key, "do not touch").unwrap();
        let mut data = STANDARD.decode(&payload).unwrap();
        let last = data.len() - 1;
        data[last] ^= 0x01;
        let tampered = STANDARD.encode(data);

        let err = decrypt(&key, &tampered).unwrap_err();
        assert!(matches!(err, CoreError::Decryption(_)));
    }

    #[test]
    fn test_empty_plaintext_rejected() {
        let key = conversation_key(&[3; 32]);
        assert!(encrypt(&key, "").is_err());
    }

    #[test]
    fn test_unknown_version_rejected() {
        assert!(matches!(
            decrypt(&[0; 32], "#not-supported"),
            Err(CoreError::Decode(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_padding_covers_plaintext(len in 1usize..=65535) {
            let padded = calc_padded_len(len);
            prop_assert!(padded >= len);
            prop_assert!(padded >= 32);
        }
    }
}
