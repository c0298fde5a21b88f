//! Signed tree heads: parsing, signature verification, and persistence.
//!
//! The log signs a fixed binary encoding of `{timestamp, tree_size,
//! root_hash}` (RFC 6962 §3.5) wrapped in a TLS `DigitallySigned`
//! structure. The archiver accepts the two algorithm pairs deployed logs
//! use: ECDSA P-256/SHA-256 and RSA PKCS#1 v1.5/SHA-256.

use crate::{error::ArchiveError, layout, merkle};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use p256::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use signature::Verifier;
use std::{fs, path::Path};

// Algorithm identifiers from the TLS HashAlgorithm and SignatureAlgorithm
// registries, as used by the DigitallySigned wrapper.
const HASH_ALGORITHM_SHA256: u8 = 4;
const SIGNATURE_ALGORITHM_RSA: u8 = 1;
const SIGNATURE_ALGORITHM_ECDSA: u8 = 3;

// TreeHeadSignature header: CT v1 and the tree_hash signature type.
const CT_VERSION_V1: u8 = 0;
const SIGNATURE_TYPE_TREE_HASH: u8 = 1;

/// `get-sth` response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTreeHead {
    pub tree_size: u64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Base64 root hash over `tree_size` entries.
    pub sha256_root_hash: String,
    /// Base64 `DigitallySigned` blob.
    pub tree_head_signature: String,
}

/// A signed tree head together with the exact bytes the log served.
///
/// The raw bytes are what gets persisted and later packaged into torrents,
/// so downloaders re-verify the log's own serialization rather than ours.
#[derive(Debug, Clone)]
pub struct Sth {
    pub head: SignedTreeHead,
    raw: Vec<u8>,
}

impl Sth {
    pub fn from_response(raw: Vec<u8>) -> Result<Self, ArchiveError> {
        let head = serde_json::from_slice(&raw)?;
        Ok(Self { head, raw })
    }

    /// Decoded `sha256_root_hash`.
    pub fn root_hash(&self) -> Result<merkle::Hash, ArchiveError> {
        merkle::decode_hash(&self.head.sha256_root_hash)
    }

    /// The RFC 6962 §3.5 `TreeHeadSignature` payload the log signed:
    /// version, signature type, timestamp, tree size, root hash, all
    /// big-endian packed.
    pub fn signed_payload(&self) -> Result<Vec<u8>, ArchiveError> {
        let mut payload = Vec::with_capacity(2 + 8 + 8 + 32);
        payload.push(CT_VERSION_V1);
        payload.push(SIGNATURE_TYPE_TREE_HASH);
        payload.extend_from_slice(&self.head.timestamp.to_be_bytes());
        payload.extend_from_slice(&self.head.tree_size.to_be_bytes());
        payload.extend_from_slice(&self.root_hash()?);
        Ok(payload)
    }

    /// Verify the tree head signature against a DER `SubjectPublicKeyInfo`.
    pub fn verify(&self, public_key_der: &[u8]) -> Result<(), ArchiveError> {
        let signed = DigitallySigned::parse(&BASE64.decode(&self.head.tree_head_signature)?)?;
        let payload = self.signed_payload()?;
        match signed.algorithm {
            SignatureAlgorithm::EcdsaP256Sha256 => {
                let key = p256::ecdsa::VerifyingKey::from_public_key_der(public_key_der)?;
                let signature = p256::ecdsa::Signature::from_der(&signed.signature)
                    .map_err(ArchiveError::SthSignatureInvalid)?;
                key.verify(&payload, &signature)
                    .map_err(ArchiveError::SthSignatureInvalid)
            }
            SignatureAlgorithm::RsaPkcs1Sha256 => {
                let key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(
                    RsaPublicKey::from_public_key_der(public_key_der)?,
                );
                let signature = rsa::pkcs1v15::Signature::try_from(signed.signature.as_slice())
                    .map_err(ArchiveError::SthSignatureInvalid)?;
                key.verify(&payload, &signature)
                    .map_err(ArchiveError::SthSignatureInvalid)
            }
        }
    }

    /// Persist the bytes the log served, named after the tree size.
    pub fn write(&self, pkg_root_dir: &Path) -> Result<(), ArchiveError> {
        let path = pkg_root_dir.join(layout::sth_file_name(self.head.tree_size));
        fs::write(path, &self.raw)?;
        Ok(())
    }
}

/// The two signature algorithms deployed RFC 6962 logs use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    RsaPkcs1Sha256,
    EcdsaP256Sha256,
}

/// TLS `DigitallySigned` wrapper around the tree head signature.
#[derive(Debug, Clone)]
pub struct DigitallySigned {
    pub algorithm: SignatureAlgorithm,
    pub signature: Vec<u8>,
}

impl DigitallySigned {
    /// Unpack `{hash_algo: u8, sig_algo: u8, sig_len: u16be, sig}`.
    pub fn parse(bytes: &[u8]) -> Result<Self, ArchiveError> {
        let [hash_algo, sig_algo, length_hi, length_lo, signature @ ..] = bytes else {
            return Err(ArchiveError::SignatureFormat(
                "shorter than the four-byte header",
            ));
        };
        let algorithm = match (*hash_algo, *sig_algo) {
            (HASH_ALGORITHM_SHA256, SIGNATURE_ALGORITHM_RSA) => {
                SignatureAlgorithm::RsaPkcs1Sha256
            }
            (HASH_ALGORITHM_SHA256, SIGNATURE_ALGORITHM_ECDSA) => {
                SignatureAlgorithm::EcdsaP256Sha256
            }
            (hash_algo, sig_algo) => {
                return Err(ArchiveError::SignatureAlgorithm {
                    hash_algo,
                    sig_algo,
                })
            }
        };
        let declared = u16::from_be_bytes([*length_hi, *length_lo]) as usize;
        if declared != signature.len() {
            return Err(ArchiveError::SignatureFormat(
                "declared length does not match the signature",
            ));
        }
        Ok(Self {
            algorithm,
            signature: signature.to_vec(),
        })
    }
}

/// The known-logs list; only the fields the archiver reads.
#[derive(Debug, Deserialize)]
pub struct LogList {
    pub logs: Vec<LogListEntry>,
}

#[derive(Debug, Deserialize)]
pub struct LogListEntry {
    pub url: String,
    /// Base64 DER `SubjectPublicKeyInfo`.
    pub key: String,
}

/// DER public key for the log at `url`, looked up by exact match.
pub fn log_public_key(log_list_file: &Path, url: &str) -> Result<Vec<u8>, ArchiveError> {
    let list: LogList = serde_json::from_slice(&fs::read(log_list_file)?)?;
    let entry = list
        .logs
        .into_iter()
        .find(|log| log.url == url)
        .ok_or_else(|| ArchiveError::LogUnknown {
            url: url.to_owned(),
        })?;
    Ok(BASE64.decode(entry.key)?)
}
