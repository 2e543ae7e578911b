//! RSA-SHA256 (PKCS#1 v1.5) signing and verification, AES-256-GCM opening, nonces.

use crate::error::{PaymentError, Result};
use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::Rng;
use rand::distributions::Alphanumeric;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use std::path::Path;

const GCM_NONCE_LEN: usize = 12;
const AES_256_KEY_LEN: usize = 32;

/// Merchant-side signer. Signatures are deterministic for a given key and message.
pub struct RsaSigner {
    key: SigningKey<Sha256>,
}

impl RsaSigner {
    /// Accepts PKCS#8 or PKCS#1 PEM, or bare base64 DER as handed out by gateway consoles.
    pub fn from_pem(text: &str) -> Result<Self> {
        let key = parse_private_key(text)?;
        Ok(Self {
            key: SigningKey::<Sha256>::new(key),
        })
    }

    pub fn from_pem_file(path: &Path) -> Result<Self> {
        Self::from_pem(&read_key_file(path)?)
    }

    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        self.key
            .try_sign(message)
            .map(|sig| sig.to_vec())
            .map_err(|e| PaymentError::Crypto(format!("rsa sign: {e}")))
    }

    pub fn sign_base64(&self, message: &[u8]) -> Result<String> {
        Ok(STANDARD.encode(self.sign(message)?))
    }
}

/// Counter-party public key used to authenticate inbound payloads.
pub struct RsaVerifier {
    key: VerifyingKey<Sha256>,
}

impl RsaVerifier {
    /// Accepts SPKI or PKCS#1 PEM, or bare base64 SPKI DER.
    pub fn from_pem(text: &str) -> Result<Self> {
        let key = parse_public_key(text)?;
        Ok(Self {
            key: VerifyingKey::<Sha256>::new(key),
        })
    }

    pub fn from_pem_file(path: &Path) -> Result<Self> {
        Self::from_pem(&read_key_file(path)?)
    }

    /// `false` on any mismatch, including a signature that is not valid base64.
    pub fn verify_base64(&self, message: &[u8], signature_b64: &str) -> bool {
        let Ok(raw) = STANDARD.decode(signature_b64.trim()) else {
            return false;
        };
        let Ok(signature) = Signature::try_from(raw.as_slice()) else {
            return false;
        };
        self.key.verify(message, &signature).is_ok()
    }
}

fn read_key_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| {
        PaymentError::Config(format!("cannot read key file {}: {e}", path.display()))
    })
}

fn bare_der(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| PaymentError::Config(format!("key is neither PEM nor base64 DER: {e}")))
}

fn parse_private_key(text: &str) -> Result<RsaPrivateKey> {
    let text = text.trim();
    let parsed = if text.starts_with("-----BEGIN") {
        RsaPrivateKey::from_pkcs8_pem(text).or_else(|pkcs8_err| {
            RsaPrivateKey::from_pkcs1_pem(text)
                .map_err(|pkcs1_err| format!("{pkcs8_err}; {pkcs1_err}"))
        })
    } else {
        let der = bare_der(text)?;
        RsaPrivateKey::from_pkcs8_der(&der).or_else(|pkcs8_err| {
            RsaPrivateKey::from_pkcs1_der(&der)
                .map_err(|pkcs1_err| format!("{pkcs8_err}; {pkcs1_err}"))
        })
    };
    parsed.map_err(|e| PaymentError::Config(format!("invalid RSA private key: {e}")))
}

fn parse_public_key(text: &str) -> Result<RsaPublicKey> {
    let text = text.trim();
    if text.starts_with("-----BEGIN RSA PUBLIC KEY") {
        return RsaPublicKey::from_pkcs1_pem(text)
            .map_err(|e| PaymentError::Config(format!("invalid RSA public key: {e}")));
    }
    let parsed = if text.starts_with("-----BEGIN") {
        RsaPublicKey::from_public_key_pem(text)
    } else {
        RsaPublicKey::from_public_key_der(&bare_der(text)?)
    };
    parsed.map_err(|e| PaymentError::Config(format!("invalid RSA public key: {e}")))
}

/// Opens an AES-256-GCM payload whose 16-byte tag is appended to `ciphertext`.
///
/// Any failure, including a wrong key or tampered associated data, is `DecryptFailed`.
pub fn aes_256_gcm_open(
    key: &[u8],
    nonce: &[u8],
    associated_data: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    if key.len() != AES_256_KEY_LEN || nonce.len() != GCM_NONCE_LEN {
        return Err(PaymentError::DecryptFailed);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| PaymentError::DecryptFailed)?;
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad: associated_data,
            },
        )
        .map_err(|_| PaymentError::DecryptFailed)
}

/// Random alphanumeric string used as request nonce.
pub fn nonce_str(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
