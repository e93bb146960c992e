//! Sealing and opening of one-time secrets.
//!
//! `seal` mints a fresh key for every secret and returns it as the token;
//! `open` reverses it. Both sides use unpadded base64url so that tokens and
//! ciphertexts are safe to store as `token:ciphertext` lines.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use zeroize::Zeroizing;

use crate::aead::{decrypt, encrypt};
use crate::keys::SecretKey;
use onetime_common::{Error, Result, SealedSecret};

/// Encrypt `plaintext` under a freshly generated key.
///
/// # Postconditions
/// - The token is unique per call within the bounds of a 256-bit random source
/// - The ciphertext contains only base64url characters
///
/// # Errors
/// - Returns `Crypto` only if the AEAD refuses the input
pub fn seal(plaintext: &str) -> Result<SealedSecret> {
    let key = SecretKey::generate();
    let ciphertext = encrypt(&key, plaintext.as_bytes())?;

    Ok(SealedSecret {
        token: key.to_token()?,
        ciphertext: URL_SAFE_NO_PAD.encode(ciphertext),
    })
}

/// Decrypt a ciphertext produced by [`seal`] with its token.
///
/// # Errors
/// - Returns `Decryption` if the token is malformed, does not match the
///   key the ciphertext was sealed with, the ciphertext was tampered with
///   or corrupted, or the recovered bytes are not UTF-8
pub fn open(token: &str, ciphertext: &str) -> Result<String> {
    let key = SecretKey::from_token(token)?;
    let raw = URL_SAFE_NO_PAD
        .decode(ciphertext.trim_end())
        .map_err(|_| Error::Decryption("Ciphertext is not valid base64url".to_string()))?;

    let plaintext = Zeroizing::new(decrypt(&key, &raw)?);

    String::from_utf8(plaintext.to_vec())
        .map_err(|_| Error::Decryption("Plaintext is not valid UTF-8".to_string()))
}
