// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-disk store for encrypted secret records.
//!
//! One JSONL line per record. Mutations rewrite the whole file through a
//! temp file + atomic rename; the vault is small and write-rare, so the
//! rewrite keeps recovery trivial. Crypto happens above this layer — records
//! arrive already encrypted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum VaultIoError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// An encrypted secret at rest. All binary fields are lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRecord {
    pub tenant: String,
    pub name: String,
    /// Per-secret key-derivation salt
    pub salt: String,
    /// AEAD nonce, fresh per store
    pub nonce: String,
    /// Ciphertext with the auth tag appended
    pub ciphertext: String,
}

/// Per-tenant encrypted record file.
pub struct VaultFile {
    path: PathBuf,
    records: BTreeMap<(String, String), SecretRecord>,
}

impl VaultFile {
    /// Open or create the vault file at `path`.
    ///
    /// Unparseable lines are skipped with a warning; a secret lost to
    /// corruption is indistinguishable from one never stored.
    pub fn open(path: &Path) -> Result<Self, VaultIoError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut records = BTreeMap::new();
        match std::fs::File::open(path) {
            Ok(file) => {
                let mut reader = BufReader::new(file);
                let mut line = String::new();
                loop {
                    line.clear();
                    match reader.read_line(&mut line) {
                        Ok(0) => break,
                        Ok(_) => {}
                        Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
                        Err(e) => return Err(e.into()),
                    }
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<SecretRecord>(trimmed) {
                        Ok(record) => {
                            records.insert(
                                (record.tenant.clone(), record.name.clone()),
                                record,
                            );
                        }
                        Err(e) => {
                            warn!(path = %path.display(), error = %e, "skipping corrupt vault record");
                        }
                    }
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        Ok(Self { path: path.to_owned(), records })
    }

    pub fn get(&self, tenant: &str, name: &str) -> Option<&SecretRecord> {
        self.records.get(&(tenant.to_string(), name.to_string()))
    }

    /// Insert or replace a record and persist.
    pub fn put(&mut self, record: SecretRecord) -> Result<(), VaultIoError> {
        self.records.insert((record.tenant.clone(), record.name.clone()), record);
        self.rewrite()
    }

    /// Remove a record and persist. Returns whether it existed.
    pub fn remove(&mut self, tenant: &str, name: &str) -> Result<bool, VaultIoError> {
        let existed = self
            .records
            .remove(&(tenant.to_string(), name.to_string()))
            .is_some();
        if existed {
            self.rewrite()?;
        }
        Ok(existed)
    }

    /// Secret names for a tenant, lexicographically sorted.
    pub fn names_for(&self, tenant: &str) -> Vec<String> {
        // BTreeMap keys are already ordered (tenant, name)
        self.records
            .range((tenant.to_string(), String::new())..)
            .take_while(|((t, _), _)| t == tenant)
            .map(|((_, name), _)| name.clone())
            .collect()
    }

    /// Rewrite the whole file: temp + fsync + atomic rename.
    fn rewrite(&self) -> Result<(), VaultIoError> {
        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = std::fs::File::create(&tmp_path)?;
            for record in self.records.values() {
                let line = serde_json::to_vec(record)?;
                tmp.write_all(&line)?;
                tmp.write_all(b"\n")?;
            }
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "vault_tests.rs"]
mod tests;
