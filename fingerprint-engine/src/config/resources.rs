//! Resource archive location and at-rest encryption (spec.md section 6
//! "Resource archive").

use serde::Deserialize;

/// Encryption applied to the resource archive before it reaches
/// [`crate::archive::ResourceArchive`]. `None` means the archive is read as
/// plain (optionally gzip-compressed) bytes.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    #[default]
    None,
    Aes128,
    Aes256,
}

impl KeyType {
    /// Expected key length in bytes, or `None` for [`KeyType::None`].
    pub fn key_len(self) -> Option<usize> {
        match self {
            KeyType::None => None,
            KeyType::Aes128 => Some(16),
            KeyType::Aes256 => Some(32),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ResourcesConfig {
    /// Path to the resource archive (directory or container file) holding
    /// `VERSION`, `fp_prevalence_tls.txt`, `fingerprint_db.json`, `pyasn.db`.
    pub resources: String,
    /// Hex-encoded decryption key, required when `key_type` is not `none`.
    #[serde(default)]
    pub enc_key: Option<String>,
    #[serde(default)]
    pub key_type: KeyType,
}

impl ResourcesConfig {
    /// Decode `enc_key` and check its length against `key_type`. Called from
    /// [`super::loader::load_from_path`]'s validation pass, not on any
    /// per-packet path.
    pub fn decoded_key(&self) -> Result<Option<Vec<u8>>, String> {
        let Some(expected_len) = self.key_type.key_len() else {
            return Ok(None);
        };
        let hex = self
            .enc_key
            .as_deref()
            .ok_or_else(|| "enc_key is required when key_type is not \"none\"".to_string())?;
        let bytes = decode_hex(hex).map_err(|e| format!("enc_key is not valid hex: {e}"))?;
        if bytes.len() != expected_len {
            return Err(format!(
                "enc_key has {} bytes, {:?} requires {expected_len}",
                bytes.len(),
                self.key_type
            ));
        }
        Ok(Some(bytes))
    }
}

fn decode_hex(s: &str) -> Result<Vec<u8>, String> {
    if !s.len().is_multiple_of(2) {
        return Err("odd number of hex digits".to_string());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_type_none_requires_no_key() {
        let cfg = ResourcesConfig { resources: "/res".into(), enc_key: None, key_type: KeyType::None };
        assert_eq!(cfg.decoded_key().unwrap(), None);
    }

    #[test]
    fn aes128_rejects_missing_key() {
        let cfg = ResourcesConfig { resources: "/res".into(), enc_key: None, key_type: KeyType::Aes128 };
        assert!(cfg.decoded_key().is_err());
    }

    #[test]
    fn aes256_rejects_wrong_length() {
        let cfg = ResourcesConfig {
            resources: "/res".into(),
            enc_key: Some("aabb".to_string()),
            key_type: KeyType::Aes256,
        };
        assert!(cfg.decoded_key().is_err());
    }

    #[test]
    fn aes128_accepts_32_hex_chars() {
        let cfg = ResourcesConfig {
            resources: "/res".into(),
            enc_key: Some("00".repeat(16)),
            key_type: KeyType::Aes128,
        };
        assert_eq!(cfg.decoded_key().unwrap(), Some(vec![0u8; 16]));
    }
}
