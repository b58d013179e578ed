//! Legacy envelope: AES-256-CBC keyed by the raw ECDH x coordinate.
//!
//! Wire form is `base64(ciphertext) + "?iv=" + base64(iv)`.

use aes::Aes256;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use cbc::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::error::{CoreError, Result};

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Separator between ciphertext and IV.
pub const IV_SEPARATOR: &str = "?iv=";

/// Whether a payload is in the legacy wire form.
pub fn is_legacy_payload(payload: &str) -> bool {
    payload.contains(IV_SEPARATOR)
}

/// Encrypt with a fresh random IV.
pub fn encrypt(key: &[u8; 32], plaintext: &str) -> String {
    let mut iv = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut iv);
    encrypt_with_iv(key, plaintext, &iv)
}

/// Encrypt with a caller-supplied IV.
pub fn encrypt_with_iv(key: &[u8; 32], plaintext: &str, iv: &[u8; 16]) -> String {
    let ciphertext = Aes256CbcEnc::new(&(*key).into(), &(*iv).into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());
    format!(
        "{}{}{}",
        STANDARD.encode(ciphertext),
        IV_SEPARATOR,
        STANDARD.encode(iv)
    )
}

/// Decrypt a legacy payload.
pub fn decrypt(key: &[u8; 32], payload: &str) -> Result<String> {
    let (ct_b64, iv_b64) = payload
        .split_once(IV_SEPARATOR)
        .ok_or_else(|| CoreError::Decode("missing ?iv= separator".into()))?;

    let ciphertext = STANDARD
        .decode(ct_b64)
        .map_err(|e| CoreError::Decode(format!("ciphertext: {}", e)))?;
    let iv: [u8; 16] = STANDARD
        .decode(iv_b64)
        .map_err(|e| CoreError::Decode(format!("iv: {}", e)))?
        .try_into()
        .map_err(|_| CoreError::Decode("iv must be 16 bytes".into()))?;

    let plaintext = Aes256CbcDec::new(&(*key).into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
        .map_err(|_| CoreError::Decryption("bad padding".into()))?;

    String::from_utf8(plaintext).map_err(|_| CoreError::Decryption("invalid utf-8".into()))
}
