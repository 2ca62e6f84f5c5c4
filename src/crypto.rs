//! Cryptographic logics.
//!
//! Content encryption follows RFC 7518: the CBC-HMAC methods of §5.2 and
//! AES-GCM of §5.3. Signatures are delegated to [`jsonwebtoken`].

use std::fmt;

use aes::{Aes128, Aes256};
use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Sha384, Sha512};
use zeroize::Zeroizing;

use crate::error::{Result, TokenError};

const CBC_IV_LENGTH: usize = 16;
const GCM_IV_LENGTH: usize = 12;
const GCM_TAG_LENGTH: usize = 16;

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;
type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Raw key material, zeroed on drop.
#[derive(Clone)]
pub struct SecretKey(Zeroizing<Vec<u8>>);

impl SecretKey {
    /// Create a new [`SecretKey`] from the bytes of `secret`.
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self(Zeroizing::new(secret.as_ref().to_vec()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretKey([REDACTED; {}])", self.len())
    }
}

/// Symmetric authenticated encryption methods, named after their JOSE `enc`
/// identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EncryptionMethod {
    #[default]
    #[serde(rename = "A128CBC-HS256")]
    A128CbcHs256,
    #[serde(rename = "A256CBC-HS512")]
    A256CbcHs512,
    #[serde(rename = "A128GCM")]
    A128Gcm,
    #[serde(rename = "A256GCM")]
    A256Gcm,
}

/// Output of a content encryption.
#[derive(Debug)]
pub struct Sealed {
    pub iv: Vec<u8>,
    pub ciphertext: Vec<u8>,
    pub tag: Vec<u8>,
}

impl EncryptionMethod {
    /// JOSE `enc` header value.
    pub fn name(self) -> &'static str {
        match self {
            Self::A128CbcHs256 => "A128CBC-HS256",
            Self::A256CbcHs512 => "A256CBC-HS512",
            Self::A128Gcm => "A128GCM",
            Self::A256Gcm => "A256GCM",
        }
    }

    /// Exact key length, in bytes.
    pub fn key_length(self) -> usize {
        match self {
            Self::A128CbcHs256 => 32,
            Self::A256CbcHs512 => 64,
            Self::A128Gcm => 16,
            Self::A256Gcm => 32,
        }
    }

    fn iv_length(self) -> usize {
        match self {
            Self::A128CbcHs256 | Self::A256CbcHs512 => CBC_IV_LENGTH,
            Self::A128Gcm | Self::A256Gcm => GCM_IV_LENGTH,
        }
    }

    fn tag_length(self) -> usize {
        match self {
            Self::A128CbcHs256 => 16,
            Self::A256CbcHs512 => 32,
            Self::A128Gcm | Self::A256Gcm => GCM_TAG_LENGTH,
        }
    }

    /// Check that `key` can be used with this method.
    pub fn check_key(self, key: &SecretKey) -> Result<()> {
        if key.len() != self.key_length() {
            return Err(TokenError::InvalidKeyMaterial {
                value: key.len(),
                expected: format!("exactly {}", self.key_length()),
            });
        }

        Ok(())
    }

    /// Encrypt `plaintext` under a fresh random IV, authenticating `aad`.
    pub fn encrypt(
        self,
        key: &SecretKey,
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Sealed> {
        let mut iv = vec![0u8; self.iv_length()];
        OsRng.fill_bytes(&mut iv);
        self.encrypt_with_iv(key, iv, aad, plaintext)
    }

    fn encrypt_with_iv(
        self,
        key: &SecretKey,
        iv: Vec<u8>,
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Sealed> {
        self.check_key(key)?;
        let key = key.as_bytes();

        match self {
            Self::A128CbcHs256 => {
                let (mac_key, enc_key) = key.split_at(key.len() / 2);
                let ciphertext = Aes128CbcEnc::new_from_slices(enc_key, &iv)
                    .map_err(encoding)?
                    .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
                let tag = cbc_hmac::<Hmac<Sha256>>(mac_key, aad, &iv, &ciphertext)
                    .ok_or_else(|| encoding("invalid mac key"))?
                    .finalize()
                    .into_bytes()[..self.tag_length()]
                    .to_vec();

                Ok(Sealed {
                    iv,
                    ciphertext,
                    tag,
                })
            },
            Self::A256CbcHs512 => {
                let (mac_key, enc_key) = key.split_at(key.len() / 2);
                let ciphertext = Aes256CbcEnc::new_from_slices(enc_key, &iv)
                    .map_err(encoding)?
                    .encrypt_padded_vec_mut::<Pkcs7>(plaintext);
                let tag = cbc_hmac::<Hmac<Sha512>>(mac_key, aad, &iv, &ciphertext)
                    .ok_or_else(|| encoding("invalid mac key"))?
                    .finalize()
                    .into_bytes()[..self.tag_length()]
                    .to_vec();

                Ok(Sealed {
                    iv,
                    ciphertext,
                    tag,
                })
            },
            Self::A128Gcm => gcm_encrypt::<Aes128Gcm>(key, iv, aad, plaintext),
            Self::A256Gcm => gcm_encrypt::<Aes256Gcm>(key, iv, aad, plaintext),
        }
    }

    /// Authenticate then decrypt.
    ///
    /// Every failure, including malformed lengths, is reported as
    /// [`TokenError::CryptoVerificationFailed`].
    pub fn decrypt(
        self,
        key: &SecretKey,
        aad: &[u8],
        iv: &[u8],
        ciphertext: &[u8],
        tag: &[u8],
    ) -> Result<Vec<u8>> {
        if key.len() != self.key_length()
            || iv.len() != self.iv_length()
            || tag.len() != self.tag_length()
        {
            return Err(TokenError::CryptoVerificationFailed);
        }
        let key = key.as_bytes();

        match self {
            Self::A128CbcHs256 => {
                let (mac_key, enc_key) = key.split_at(key.len() / 2);
                cbc_hmac::<Hmac<Sha256>>(mac_key, aad, iv, ciphertext)
                    .ok_or(TokenError::CryptoVerificationFailed)?
                    .verify_truncated_left(tag)
                    .map_err(|_| TokenError::CryptoVerificationFailed)?;

                Aes128CbcDec::new_from_slices(enc_key, iv)
                    .map_err(|_| TokenError::CryptoVerificationFailed)?
                    .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                    .map_err(|_| TokenError::CryptoVerificationFailed)
            },
            Self::A256CbcHs512 => {
                let (mac_key, enc_key) = key.split_at(key.len() / 2);
                cbc_hmac::<Hmac<Sha512>>(mac_key, aad, iv, ciphertext)
                    .ok_or(TokenError::CryptoVerificationFailed)?
                    .verify_truncated_left(tag)
                    .map_err(|_| TokenError::CryptoVerificationFailed)?;

                Aes256CbcDec::new_from_slices(enc_key, iv)
                    .map_err(|_| TokenError::CryptoVerificationFailed)?
                    .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
                    .map_err(|_| TokenError::CryptoVerificationFailed)
            },
            Self::A128Gcm => gcm_decrypt::<Aes128Gcm>(key, iv, aad, ciphertext, tag),
            Self::A256Gcm => gcm_decrypt::<Aes256Gcm>(key, iv, aad, ciphertext, tag),
        }
    }
}

/// HMAC over `AAD || IV || ciphertext || AL`, where `AL` is the AAD length
/// in bits as a big-endian u64.
fn cbc_hmac<M: Mac + KeyInit>(
    mac_key: &[u8],
    aad: &[u8],
    iv: &[u8],
    ciphertext: &[u8],
) -> Option<M> {
    let mut mac = <M as Mac>::new_from_slice(mac_key).ok()?;
    mac.update(aad);
    mac.update(iv);
    mac.update(ciphertext);
    mac.update(&(aad.len() as u64 * 8).to_be_bytes());
    Some(mac)
}

fn gcm_encrypt<C: Aead + KeyInit>(
    key: &[u8],
    iv: Vec<u8>,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Sealed> {
    let cipher = <C as KeyInit>::new_from_slice(key).map_err(encoding)?;
    let mut ciphertext = cipher
        .encrypt(
            GenericArray::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(encoding)?;
    let tag = ciphertext.split_off(ciphertext.len() - GCM_TAG_LENGTH);

    Ok(Sealed {
        iv,
        ciphertext,
        tag,
    })
}

fn gcm_decrypt<C: Aead + KeyInit>(
    key: &[u8],
    iv: &[u8],
    aad: &[u8],
    ciphertext: &[u8],
    tag: &[u8],
) -> Result<Vec<u8>> {
    let cipher = <C as KeyInit>::new_from_slice(key)
        .map_err(|_| TokenError::CryptoVerificationFailed)?;

    let mut msg = Vec::with_capacity(ciphertext.len() + tag.len());
    msg.extend_from_slice(ciphertext);
    msg.extend_from_slice(tag);

    cipher
        .decrypt(GenericArray::from_slice(iv), Payload { msg: &msg, aad })
        .map_err(|_| TokenError::CryptoVerificationFailed)
}

fn encoding(err: impl fmt::Display) -> TokenError {
    TokenError::Encoding(err.to_string())
}

/// HMAC algorithms used to sign tokens.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SigningAlgorithm {
    #[default]
    HS256,
    HS384,
    HS512,
}

impl SigningAlgorithm {
    /// Minimum key length, in bytes: the digest output size.
    pub fn min_key_length(self) -> usize {
        use sha2::Digest;

        match self {
            Self::HS256 => <Sha256 as Digest>::output_size(),
            Self::HS384 => <Sha384 as Digest>::output_size(),
            Self::HS512 => <Sha512 as Digest>::output_size(),
        }
    }

    /// Check that `key` is long enough for this algorithm.
    pub fn check_key(self, key: &SecretKey) -> Result<()> {
        if key.len() < self.min_key_length() {
            return Err(TokenError::InvalidKeyMaterial {
                value: key.len(),
                expected: format!("at least {}", self.min_key_length()),
            });
        }

        Ok(())
    }

    pub(crate) fn as_jwt(self) -> jsonwebtoken::Algorithm {
        match self {
            Self::HS256 => jsonwebtoken::Algorithm::HS256,
            Self::HS384 => jsonwebtoken::Algorithm::HS384,
            Self::HS512 => jsonwebtoken::Algorithm::HS512,
        }
    }
}
