//! Resource archive (spec.md section 6 "Resource archive"): a streamable
//! container exposing `{name, bytes}` entries for the four files the engine
//! needs at startup — `VERSION`, `fp_prevalence_tls.txt`,
//! `fingerprint_db.json`, `pyasn.db`.
//!
//! Entries may optionally be authenticated-encrypted with AES-128 or
//! AES-256 (spec.md section 6); gzip framing is not implemented here since
//! no compression crate is part of this engine's dependency stack — see
//! DESIGN.md.

use crate::config::KeyType;
use crate::error::{EngineError, Result};
use aes_gcm::aead::{Aead, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm, KeyInit, Nonce};
use std::fs;
use std::path::{Path, PathBuf};

pub const REQUIRED_ENTRIES: &[&str] =
    &["VERSION", "fp_prevalence_tls.txt", "fingerprint_db.json", "pyasn.db"];

pub struct ArchiveEntry {
    pub name: &'static str,
    pub bytes: Vec<u8>,
}

/// A source of the engine's startup resources. Implementors decide how
/// entries are stored on disk (or elsewhere); the core only needs the four
/// named entries as raw bytes.
pub trait ResourceArchive {
    fn entries(&self) -> Result<Vec<ArchiveEntry>>;
}

/// Reads each required entry as a plain file `<root>/<name>`, or — when
/// `key_type` is not `none` — as `<root>/<name>.enc`: a 12-byte nonce
/// followed by an AEAD ciphertext with the entry name as associated data.
pub struct PlainDirArchive {
    root: PathBuf,
    key: Option<Vec<u8>>,
    key_type: KeyType,
}

impl PlainDirArchive {
    pub fn new(root: impl Into<PathBuf>, key: Option<Vec<u8>>, key_type: KeyType) -> Self {
        PlainDirArchive { root: root.into(), key, key_type }
    }

    fn read_entry(&self, name: &'static str) -> Result<Vec<u8>> {
        match self.key_type {
            KeyType::None => {
                fs::read(self.root.join(name)).map_err(EngineError::Io)
            }
            KeyType::Aes128 | KeyType::Aes256 => {
                let path = self.root.join(format!("{name}.enc"));
                let raw = fs::read(&path).map_err(EngineError::Io)?;
                self.decrypt(name, &raw)
            }
        }
    }

    fn decrypt(&self, name: &str, raw: &[u8]) -> Result<Vec<u8>> {
        let key = self
            .key
            .as_deref()
            .ok_or_else(|| EngineError::Archive("encrypted archive requires enc_key".to_string()))?;
        if raw.len() < 12 {
            return Err(EngineError::Archive(format!("{name}: ciphertext shorter than nonce")));
        }
        let (nonce_bytes, ciphertext) = raw.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        let aad = name.as_bytes();
        let plain = match self.key_type {
            KeyType::Aes128 => {
                let cipher = Aes128Gcm::new_from_slice(key)
                    .map_err(|e| EngineError::Archive(format!("{name}: bad key: {e}")))?;
                cipher.decrypt(nonce, Payload { msg: ciphertext, aad })
            }
            KeyType::Aes256 => {
                let cipher = Aes256Gcm::new_from_slice(key)
                    .map_err(|e| EngineError::Archive(format!("{name}: bad key: {e}")))?;
                cipher.decrypt(nonce, Payload { msg: ciphertext, aad })
            }
            KeyType::None => unreachable!("decrypt only called for encrypted key types"),
        };
        plain.map_err(|_| EngineError::Archive(format!("{name}: decryption failed")))
    }
}

impl ResourceArchive for PlainDirArchive {
    fn entries(&self) -> Result<Vec<ArchiveEntry>> {
        if !Path::new(&self.root).is_dir() {
            return Err(EngineError::Archive(format!("{} is not a directory", self.root.display())));
        }
        REQUIRED_ENTRIES
            .iter()
            .map(|&name| Ok(ArchiveEntry { name, bytes: self.read_entry(name)? }))
            .collect()
    }
}
