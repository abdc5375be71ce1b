//! Digest Signer
//!
//! Deterministic (RFC 6979) low-s ECDSA over a precomputed sighash, plus
//! P2WPKH witness assembly. The chain builder only ever talks to the
//! [`DigestSigner`] trait, so a remote or hardware signer can stand in for
//! the local key.

use bitcoin::{CompressedPublicKey, Witness};
use secp256k1::{ecdsa::Signature, All, Message, Secp256k1, SecretKey};
use sha2::{Digest, Sha256};

use crate::sighash::SighashMode;

/// Supported key encodings
#[derive(Clone, PartialEq, Eq)]
pub enum KeyMaterial {
    /// 32-byte secret scalar
    Raw([u8; 32]),
    /// 64 hex characters
    Hex(String),
}

impl KeyMaterial {
    pub fn to_secret_key(&self) -> Result<SecretKey, SignerError> {
        let bytes = match self {
            KeyMaterial::Raw(bytes) => *bytes,
            KeyMaterial::Hex(hex_str) => {
                let decoded = hex::decode(hex_str.trim())
                    .map_err(|e| SignerError::InvalidKeyMaterial(e.to_string()))?;
                <[u8; 32]>::try_from(decoded.as_slice()).map_err(|_| {
                    SignerError::InvalidKeyMaterial(format!(
                        "key must be 32 bytes, got {}",
                        decoded.len()
                    ))
                })?
            }
        };

        SecretKey::from_slice(&bytes).map_err(|e| SignerError::InvalidKeyMaterial(e.to_string()))
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyMaterial::Raw(_) => f.write_str("KeyMaterial::Raw(..)"),
            KeyMaterial::Hex(_) => f.write_str("KeyMaterial::Hex(..)"),
        }
    }
}

/// Anything that can sign a 32-byte sighash for a P2WPKH input
pub trait DigestSigner: Send + Sync {
    /// Compressed public key the witness will carry
    fn public_key(&self) -> CompressedPublicKey;

    /// Low-s ECDSA signature over `digest`
    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, SignerError>;

    /// DER signature followed by the sighash byte
    fn sign_for_witness(&self, digest: &[u8; 32], mode: SighashMode) -> Result<Vec<u8>, SignerError> {
        let signature = self.sign_digest(digest)?;
        let mut bytes = signature.serialize_der().to_vec();
        bytes.push(mode.to_byte());
        Ok(bytes)
    }

    /// `[signature ‖ sighash byte, compressed pubkey]`
    fn p2wpkh_witness(&self, digest: &[u8; 32], mode: SighashMode) -> Result<Witness, SignerError> {
        let signature = self.sign_for_witness(digest, mode)?;
        let public_key = self.public_key().to_bytes();
        Ok(Witness::from_slice(&[signature.as_slice(), public_key.as_slice()]))
    }
}

/// Local single-key signer
pub struct SingleKeySigner {
    secret_key: SecretKey,
    secp: Secp256k1<All>,
}

impl SingleKeySigner {
    pub fn from_material(material: &KeyMaterial) -> Result<Self, SignerError> {
        Ok(Self {
            secret_key: material.to_secret_key()?,
            secp: Secp256k1::new(),
        })
    }

    /// Create from secret key bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignerError> {
        Self::from_material(&KeyMaterial::Raw(*bytes))
    }

    /// Create from hex string
    pub fn from_hex(hex_str: &str) -> Result<Self, SignerError> {
        Self::from_material(&KeyMaterial::Hex(hex_str.to_string()))
    }

    /// Deterministic key from a seed phrase (regtest and demos only)
    pub fn from_seed(seed: &[u8]) -> Result<Self, SignerError> {
        let bytes: [u8; 32] = Sha256::digest(seed).into();
        Self::from_bytes(&bytes)
    }

    /// Generate a new random signer
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let secret_key = SecretKey::new(&mut rand::thread_rng());
        Self { secret_key, secp }
    }

    /// Get secret key hex (for backup)
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Check a signature made by this key
    pub fn verify(&self, digest: &[u8; 32], signature: &Signature) -> bool {
        let msg = Message::from_digest(*digest);
        self.secp
            .verify_ecdsa(&msg, signature, &self.public_key().0)
            .is_ok()
    }
}

impl DigestSigner for SingleKeySigner {
    fn public_key(&self) -> CompressedPublicKey {
        CompressedPublicKey(self.secret_key.public_key(&self.secp))
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<Signature, SignerError> {
        let msg = Message::from_digest(*digest);
        let mut signature = self.secp.sign_ecdsa(&msg, &self.secret_key);
        signature.normalize_s();
        Ok(signature)
    }
}

/// Sign `digest` with the given key material
pub fn sign(digest: &[u8; 32], key: &KeyMaterial) -> Result<Signature, SignerError> {
    SingleKeySigner::from_material(key)?.sign_digest(digest)
}

/// Sign and append the sighash byte, ready for a witness
pub fn sign_with_type(
    digest: &[u8; 32],
    key: &KeyMaterial,
    mode: SighashMode,
) -> Result<Vec<u8>, SignerError> {
    SingleKeySigner::from_material(key)?.sign_for_witness(digest, mode)
}

/// Signer errors
#[derive(Debug, thiserror::Error)]
pub enum SignerError {
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),
}
