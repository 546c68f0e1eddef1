// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-tenant encrypted secret store.
//!
//! Keys derive from the caller-supplied master key via HKDF-SHA256 with a
//! per-secret random salt; records encrypt under AES-256-GCM with a fresh
//! nonce every store, so storing the same value twice yields different
//! ciphertexts. A wrong master key is indistinguishable from corruption.
//! Every access is event-logged.

use crate::error::EngineError;
use crate::events::EventStore;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use hive_core::{payload, Clock, EventType, Subject, TenantId};
use hive_storage::{SecretRecord, VaultFile};
use hkdf::Hkdf;
use parking_lot::Mutex;
use rand::RngCore;
use sha2::Sha256;
use std::sync::Arc;
use zeroize::{Zeroize, Zeroizing};

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const HKDF_INFO: &[u8] = b"hive vault key v1";

pub struct Vault<C: Clock> {
    events: Arc<EventStore<C>>,
    file: Mutex<VaultFile>,
}

impl<C: Clock> Vault<C> {
    pub fn new(events: Arc<EventStore<C>>, file: VaultFile) -> Self {
        Self { events, file: Mutex::new(file) }
    }

    /// Encrypt and persist a secret.
    pub fn store(
        &self,
        tenant: &TenantId,
        name: &str,
        value: &[u8],
        master_key: &[u8],
    ) -> Result<(), EngineError> {
        let mut salt = [0u8; SALT_LEN];
        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let key = derive_key(master_key, &salt);
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), value)
            .map_err(|_| EngineError::Transient("encryption failed".to_string()))?;

        let record = SecretRecord {
            tenant: tenant.to_string(),
            name: name.to_string(),
            salt: to_hex(&salt),
            nonce: to_hex(&nonce),
            ciphertext: to_hex(&ciphertext),
        };
        self.file
            .lock()
            .put(record)
            .map_err(|e| EngineError::Transient(format!("vault write failed: {e}")))?;

        self.events.emit(
            EventType::SecretStored,
            Subject::Tenant { tenant: tenant.clone() },
            payload! { "name" => name },
        );
        Ok(())
    }

    /// Decrypt a secret.
    ///
    /// Missing records (including every cross-tenant lookup) are `NotFound`;
    /// authentication failures — wrong master key or corrupt record, the
    /// two are indistinguishable — are `PermissionDenied`.
    pub fn retrieve(
        &self,
        tenant: &TenantId,
        name: &str,
        master_key: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>, EngineError> {
        let record = self
            .file
            .lock()
            .get(tenant.as_str(), name)
            .cloned()
            .ok_or_else(|| EngineError::not_found(format!("secret {name:?}")))?;

        let decoded = from_hex(&record.salt)
            .zip(from_hex(&record.nonce))
            .zip(from_hex(&record.ciphertext));

        let plaintext = decoded.and_then(|((salt, nonce), ciphertext)| {
            if nonce.len() != NONCE_LEN {
                return None;
            }
            let key = derive_key(master_key, &salt);
            let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_ref()));
            cipher.decrypt(Nonce::from_slice(&nonce), ciphertext.as_slice()).ok()
        });

        match plaintext {
            Some(value) => {
                self.events.emit(
                    EventType::SecretAccessed,
                    Subject::Tenant { tenant: tenant.clone() },
                    payload! { "name" => name },
                );
                Ok(Zeroizing::new(value))
            }
            None => {
                self.events.emit(
                    EventType::SecretAccessDenied,
                    Subject::Tenant { tenant: tenant.clone() },
                    payload! { "name" => name },
                );
                Err(EngineError::PermissionDenied("secret access denied".to_string()))
            }
        }
    }

    /// Remove a secret. Idempotent.
    pub fn revoke(&self, tenant: &TenantId, name: &str) -> Result<(), EngineError> {
        let existed = self
            .file
            .lock()
            .remove(tenant.as_str(), name)
            .map_err(|e| EngineError::Transient(format!("vault write failed: {e}")))?;

        if existed {
            self.events.emit(
                EventType::SecretRevoked,
                Subject::Tenant { tenant: tenant.clone() },
                payload! { "name" => name },
            );
        }
        Ok(())
    }

    /// Secret names for a tenant, lexicographically sorted.
    pub fn list_secrets(&self, tenant: &TenantId) -> Vec<String> {
        self.file.lock().names_for(tenant.as_str())
    }
}

/// HKDF-SHA256 over the master key with a per-secret salt.
fn derive_key(master_key: &[u8], salt: &[u8]) -> Zeroizing<[u8; 32]> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), master_key);
    let mut okm = Zeroizing::new([0u8; 32]);
    // Only fails for absurd output lengths; 32 bytes is always valid.
    if hkdf.expand(HKDF_INFO, okm.as_mut()).is_err() {
        okm.zeroize();
    }
    okm
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn from_hex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
#[path = "vault_tests.rs"]
mod tests;
