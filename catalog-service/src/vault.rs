//! Credential vault.
//!
//! Server passwords are stored as AES-256-CBC ciphertext and decrypted only
//! right before a probe opens its connection.
//!
//! # Key derivation
//!
//! The configured secret's UTF-8 bytes become the key: secrets longer than
//! 32 bytes are truncated, shorter ones are right-padded with ASCII `'0'`
//! (0x30) up to 32 bytes. Changing this rule makes every stored ciphertext
//! undecryptable.
//!
//! # Ciphertext format
//!
//! `hex(iv) ":" hex(ciphertext)`, lowercase hex, a fresh random 16-byte IV per
//! call (thread-local CSPRNG seeded from the OS), PKCS#7 padding.

use std::fmt;

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use thiserror::Error;
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES-256 key length in bytes.
pub const KEY_LEN: usize = 32;
/// CBC IV length in bytes.
pub const IV_LEN: usize = 16;
const KEY_PAD_BYTE: u8 = b'0';

/// Why a ciphertext could not be turned back into a credential.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecryptError {
    #[error("ciphertext is not in `iv:data` form")]
    Malformed,
    #[error("ciphertext is not valid hex")]
    InvalidHex,
    #[error("iv must be {IV_LEN} bytes, got {0}")]
    InvalidIv(usize),
    /// Bad padding: wrong key or tampered data.
    #[error("ciphertext does not decrypt under the configured key")]
    KeyMismatch,
    #[error("decrypted credential is not valid UTF-8")]
    InvalidUtf8,
}

/// A decrypted password, alive for one probe.
///
/// Zeroed on drop and never printed.
pub struct DecryptedCredential(Zeroizing<String>);

impl DecryptedCredential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    /// Exposes the password to a driver.
    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for DecryptedCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecryptedCredential(<redacted>)")
    }
}

/// Symmetric encrypt/decrypt of server passwords with an injected key.
pub struct CredentialVault {
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl CredentialVault {
    /// Creates a vault keyed by `secret` (see module docs for normalization).
    pub fn new(secret: &str) -> Self {
        Self {
            key: Zeroizing::new(derive_key(secret)),
        }
    }

    /// Encrypts `plaintext` under a fresh random IV.
    pub fn encrypt(&self, plaintext: &str) -> String {
        let iv: [u8; IV_LEN] = rand::random();

        let encrypted = Aes256CbcEnc::new(&(*self.key).into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext.as_bytes());

        format!("{}:{}", hex::encode(iv), hex::encode(encrypted))
    }

    /// Decrypts a ciphertext produced by [`CredentialVault::encrypt`].
    ///
    /// Failures are logged and returned; callers treat them as an unusable
    /// credential.
    pub fn decrypt(&self, ciphertext: &str) -> Result<DecryptedCredential, DecryptError> {
        self.try_decrypt(ciphertext).inspect_err(|e| {
            tracing::warn!(error = %e, "credential decryption failed");
        })
    }

    fn try_decrypt(&self, ciphertext: &str) -> Result<DecryptedCredential, DecryptError> {
        let (iv_hex, data_hex) = ciphertext.split_once(':').ok_or(DecryptError::Malformed)?;
        let iv = hex::decode(iv_hex).map_err(|_| DecryptError::InvalidHex)?;
        let data = hex::decode(data_hex).map_err(|_| DecryptError::InvalidHex)?;
        let iv: [u8; IV_LEN] = iv
            .as_slice()
            .try_into()
            .map_err(|_| DecryptError::InvalidIv(iv.len()))?;

        let plain = Aes256CbcDec::new(&(*self.key).into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&data)
            .map_err(|_| DecryptError::KeyMismatch)?;
        let plain = Zeroizing::new(plain);

        let text = std::str::from_utf8(&plain).map_err(|_| DecryptError::InvalidUtf8)?;
        Ok(DecryptedCredential::new(text))
    }
}

/// Truncates or right-pads `secret` to exactly [`KEY_LEN`] bytes.
pub fn derive_key(secret: &str) -> [u8; KEY_LEN] {
    let mut key = [KEY_PAD_BYTE; KEY_LEN];
    let bytes = secret.as_bytes();
    let n = bytes.len().min(KEY_LEN);
    key[..n].copy_from_slice(&bytes[..n]);
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault() -> CredentialVault {
        CredentialVault::new("unit-test-secret")
    }

    #[test]
    fn test_roundtrip() {
        let vault = vault();
        let long = "x".repeat(100);
        for plain in ["", "hunter2", "p@ss:word/with:colons", "пароль-密码", long.as_str()] {
            let ct = vault.encrypt(plain);
            assert_eq!(vault.decrypt(&ct).unwrap().expose(), plain);
        }
    }

    #[test]
    fn test_fresh_iv_per_encryption() {
        let vault = vault();
        let a = vault.encrypt("same");
        let b = vault.encrypt("same");
        assert_ne!(a, b);
        assert_eq!(vault.decrypt(&a).unwrap().expose(), "same");
        assert_eq!(vault.decrypt(&b).unwrap().expose(), "same");
    }

    #[test]
    fn test_ciphertext_format() {
        let ct = vault().encrypt("hunter2");
        let (iv, data) = ct.split_once(':').unwrap();
        assert_eq!(iv.len(), IV_LEN * 2);
        assert_eq!(data.len() % 32, 0);
        assert!(ct.chars().all(|c| c == ':' || c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let plain = "hunter2-but-longer-than-a-block";
        let ct = vault().encrypt(plain);
        let other = CredentialVault::new("another-secret");
        // Garbage can occasionally unpad cleanly; it never yields the plaintext.
        match other.decrypt(&ct) {
            Ok(cred) => assert_ne!(cred.expose(), plain),
            Err(e) => assert!(matches!(e, DecryptError::KeyMismatch | DecryptError::InvalidUtf8)),
        }
    }

    #[test]
    fn test_malformed_ciphertext() {
        let vault = vault();
        assert_eq!(vault.decrypt("no-separator").unwrap_err(), DecryptError::Malformed);
        assert_eq!(vault.decrypt("zz:00").unwrap_err(), DecryptError::InvalidHex);
        assert_eq!(vault.decrypt("00ff:00").unwrap_err(), DecryptError::InvalidIv(2));
        let iv = "00".repeat(IV_LEN);
        assert_eq!(
            vault.decrypt(&format!("{}:0011", iv)).unwrap_err(),
            DecryptError::KeyMismatch
        );
    }

    #[test]
    fn test_key_derivation_pads_and_truncates() {
        let short = derive_key("abc");
        assert_eq!(&short[..3], b"abc");
        assert!(short[3..].iter().all(|b| *b == b'0'));

        let long = derive_key(&"k".repeat(40));
        assert_eq!(long, [b'k'; KEY_LEN]);

        // Secrets equal in their first 32 bytes share a key.
        let a = CredentialVault::new(&format!("{}{}", "s".repeat(32), "tail-a"));
        let b = CredentialVault::new(&format!("{}{}", "s".repeat(32), "tail-b"));
        assert_eq!(b.decrypt(&a.encrypt("pw")).unwrap().expose(), "pw");
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let cred = DecryptedCredential::new("hunter2");
        assert!(!format!("{:?}", cred).contains("hunter2"));
    }
}
