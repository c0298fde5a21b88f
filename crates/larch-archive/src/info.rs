//! Package info files: the package hash and its audit path.

use crate::{
    error::ArchiveError,
    layout::InfoName,
    merkle::{self, Hash},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// `NNN-TTTTTTTTTT.info` payload.
///
/// `merkle_proof` starts out empty and is filled once the global tree over
/// all package hashes has been computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageInfo {
    /// Base64 Merkle root of the package's entries.
    pub pkg_hash: String,
    /// Base64 audit path from the package root to the tree head, bottom up.
    pub merkle_proof: Vec<String>,
}

impl PackageInfo {
    pub fn new(pkg_hash: Hash) -> Self {
        Self {
            pkg_hash: BASE64.encode(pkg_hash),
            merkle_proof: Vec::new(),
        }
    }

    /// Decoded `pkg_hash`.
    pub fn pkg_hash_bytes(&self) -> Result<Hash, ArchiveError> {
        merkle::decode_hash(&self.pkg_hash)
    }

    /// Decoded `merkle_proof`.
    pub fn proof_bytes(&self) -> Result<Vec<Hash>, ArchiveError> {
        self.merkle_proof
            .iter()
            .map(|hash| merkle::decode_hash(hash))
            .collect()
    }

    pub fn set_proof(&mut self, proof: &[Hash]) {
        self.merkle_proof = proof.iter().map(|hash| BASE64.encode(hash)).collect();
    }

    pub fn read(pkg_root_dir: &Path, name: &InfoName) -> Result<Self, ArchiveError> {
        Ok(serde_json::from_slice(&fs::read(
            pkg_root_dir.join(name.file_name()),
        )?)?)
    }

    pub fn write(&self, pkg_root_dir: &Path, name: &InfoName) -> Result<(), ArchiveError> {
        fs::write(
            pkg_root_dir.join(name.file_name()),
            serde_json::to_vec(self)?,
        )?;
        Ok(())
    }
}
