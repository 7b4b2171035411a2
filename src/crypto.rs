//! Key material for signers: secp256k1 and ed25519 keys, addresses, and the
//! [`Signer`] capability the transaction builder signs through.

use crate::error::HarnessError;
use ed25519_dalek::{Signer as _, Verifier as _};
use once_cell::sync::Lazy;
use rand::rngs::OsRng;
use rand::RngCore;
use secp256k1::{
    constants::{COMPACT_SIGNATURE_SIZE, PUBLIC_KEY_SIZE, SECRET_KEY_SIZE},
    ecdsa::Signature,
    All, Message, PublicKey, Secp256k1, SecretKey,
};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A thread-safe, lazily initialized Secp256k1 context.
static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

pub const ED25519_PUBLIC_KEY_SIZE: usize = 32;
pub const ED25519_SIGNATURE_SIZE: usize = 64;

/// Account address: SHA-256 of the serialized public key.
pub type Address = [u8; 32];

/// Hashes an arbitrary name into an address. Used for module accounts and in tests.
pub fn address_from_string(s: &str) -> Address {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    hasher.finalize().into()
}

pub fn address_to_hex(addr: &Address) -> String {
    hex::encode(addr)
}

pub fn address_from_hex(hex_str: &str) -> Result<Address, HarnessError> {
    let bytes = hex::decode(hex_str)
        .map_err(|e| HarnessError::Crypto(format!("Invalid hex address: {}", e)))?;
    if bytes.len() != 32 {
        return Err(HarnessError::Crypto(format!(
            "Address must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    bytes
        .try_into()
        .map_err(|_| HarnessError::Crypto("Failed to convert bytes into address".to_string()))
}

/// Supported key algorithms. The string form is what consensus parameters list
/// as allowed public-key types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Secp256k1,
    Ed25519,
}

impl KeyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Secp256k1 => "secp256k1",
            KeyType::Ed25519 => "ed25519",
        }
    }
}

/// A public key tagged with its algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PubKey {
    Secp256k1(#[serde(with = "hex")] Vec<u8>),
    Ed25519(#[serde(with = "hex")] Vec<u8>),
}

impl PubKey {
    pub fn key_type(&self) -> KeyType {
        match self {
            PubKey::Secp256k1(_) => KeyType::Secp256k1,
            PubKey::Ed25519(_) => KeyType::Ed25519,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PubKey::Secp256k1(bytes) | PubKey::Ed25519(bytes) => bytes,
        }
    }

    pub fn address(&self) -> Address {
        Sha256::digest(self.as_bytes()).into()
    }

    /// Verifies `signature` over `message` with this key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), HarnessError> {
        match self {
            PubKey::Secp256k1(bytes) => verify_signature(bytes, message, signature),
            PubKey::Ed25519(bytes) => verify_ed25519(bytes, message, signature),
        }
    }
}

/// Capability a transaction signer supplies: a public key and a way to sign
/// opaque bytes.
pub trait Signer {
    fn pub_key(&self) -> PubKey;

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, HarnessError>;

    fn address(&self) -> Address {
        self.pub_key().address()
    }
}

#[derive(Debug, Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Generates a new random KeyPair using the OS random number generator.
    pub fn generate() -> Result<Self, HarnessError> {
        let secret_key = SecretKey::new(&mut OsRng);
        Ok(Self::from_secret_key(secret_key))
    }

    pub fn from_secret_key(secret_key: SecretKey) -> Self {
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        KeyPair {
            secret_key,
            public_key,
        }
    }

    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, HarnessError> {
        let secret_key = SecretKey::from_slice(bytes).map_err(|e| {
            if bytes.len() != SECRET_KEY_SIZE {
                HarnessError::Crypto(format!(
                    "Secret key must be {} bytes, got {}",
                    SECRET_KEY_SIZE,
                    bytes.len()
                ))
            } else {
                HarnessError::Crypto(format!("Invalid secret key bytes: {}", e))
            }
        })?;

        Ok(Self::from_secret_key(secret_key))
    }

    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_SIZE] {
        self.public_key.serialize()
    }

    /// Signs the SHA-256 digest of `message` and returns the compact signature.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; COMPACT_SIGNATURE_SIZE], HarnessError> {
        let digest = Sha256::digest(message);

        let message = Message::from_digest_slice(&digest)
            .map_err(|e| HarnessError::Crypto(format!("Failed to create message: {}", e)))?;

        let signature = SECP256K1_CONTEXT.sign_ecdsa(&message, &self.secret_key);
        Ok(signature.serialize_compact())
    }
}

/// Private key of either supported algorithm.
#[derive(Debug, Clone)]
pub enum PrivKey {
    Secp256k1(KeyPair),
    Ed25519(ed25519_dalek::SigningKey),
}

impl PrivKey {
    pub fn generate(key_type: KeyType) -> Result<Self, HarnessError> {
        match key_type {
            KeyType::Secp256k1 => Ok(PrivKey::Secp256k1(KeyPair::generate()?)),
            KeyType::Ed25519 => {
                let mut seed = [0u8; 32];
                OsRng.fill_bytes(&mut seed);
                Ok(PrivKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(&seed)))
            }
        }
    }

    /// Derives a key deterministically from `seed`, so fixtures are reproducible.
    pub fn from_seed(key_type: KeyType, seed: &[u8]) -> Result<Self, HarnessError> {
        let secret: [u8; 32] = Sha256::digest(seed).into();
        match key_type {
            KeyType::Secp256k1 => Ok(PrivKey::Secp256k1(KeyPair::from_secret_bytes(&secret)?)),
            KeyType::Ed25519 => Ok(PrivKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(
                &secret,
            ))),
        }
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            PrivKey::Secp256k1(_) => KeyType::Secp256k1,
            PrivKey::Ed25519(_) => KeyType::Ed25519,
        }
    }
}

impl Signer for PrivKey {
    fn pub_key(&self) -> PubKey {
        match self {
            PrivKey::Secp256k1(pair) => PubKey::Secp256k1(pair.public_key_bytes().to_vec()),
            PrivKey::Ed25519(key) => PubKey::Ed25519(key.verifying_key().to_bytes().to_vec()),
        }
    }

    fn sign(&self, message: &[u8]) -> Result<Vec<u8>, HarnessError> {
        match self {
            PrivKey::Secp256k1(pair) => Ok(pair.sign(message)?.to_vec()),
            PrivKey::Ed25519(key) => Ok(key.sign(message).to_bytes().to_vec()),
        }
    }
}

/// Verifies an ECDSA signature given the raw public key bytes, message, and signature bytes.
pub fn verify_signature(
    public_key_bytes: &[u8],
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<(), HarnessError> {
    if public_key_bytes.len() != PUBLIC_KEY_SIZE {
        return Err(HarnessError::Crypto(format!(
            "Public key must be exactly {} bytes (compressed), got {}",
            PUBLIC_KEY_SIZE,
            public_key_bytes.len()
        )));
    }
    if signature_bytes.len() != COMPACT_SIGNATURE_SIZE {
        return Err(HarnessError::Crypto(format!(
            "Signature must be exactly {} bytes (compact), got {}",
            COMPACT_SIGNATURE_SIZE,
            signature_bytes.len()
        )));
    }

    let public_key = PublicKey::from_slice(public_key_bytes)
        .map_err(|e| HarnessError::Crypto(format!("Invalid public key: {}", e)))?;

    let digest = Sha256::digest(message);
    let message = Message::from_digest_slice(&digest)
        .map_err(|e| HarnessError::Crypto(format!("Failed to create message: {}", e)))?;

    let signature = Signature::from_compact(signature_bytes)
        .map_err(|e| HarnessError::Crypto(format!("Invalid signature: {}", e)))?;

    SECP256K1_CONTEXT
        .verify_ecdsa(&message, &signature, &public_key)
        .map_err(|_| HarnessError::Crypto("Signature verification failed".to_string()))
}

fn verify_ed25519(
    public_key_bytes: &[u8],
    message: &[u8],
    signature_bytes: &[u8],
) -> Result<(), HarnessError> {
    let key_bytes: [u8; ED25519_PUBLIC_KEY_SIZE] = public_key_bytes.try_into().map_err(|_| {
        HarnessError::Crypto(format!(
            "Public key must be exactly {} bytes (ed25519), got {}",
            ED25519_PUBLIC_KEY_SIZE,
            public_key_bytes.len()
        ))
    })?;
    let sig_bytes: [u8; ED25519_SIGNATURE_SIZE] = signature_bytes.try_into().map_err(|_| {
        HarnessError::Crypto(format!(
            "Signature must be exactly {} bytes (ed25519), got {}",
            ED25519_SIGNATURE_SIZE,
            signature_bytes.len()
        ))
    })?;

    let verifying_key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes)
        .map_err(|e| HarnessError::Crypto(format!("Invalid public key: {}", e)))?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);

    verifying_key
        .verify(message, &signature)
        .map_err(|_| HarnessError::Crypto("Signature verification failed".to_string()))
}
