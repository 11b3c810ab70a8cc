//! 表单字段加密
//!
//! 加密字段以其值的 JSON 序列化结果作为明文，使用 AES-256-GCM 加密。
//! 字段密钥由 `SHA-256(基础密钥 + "_" + 字段 key)` 派生，密文只能在原字段上解密。
//! 基础密钥为空时退回 [`DEFAULT_AES_KEY`]，加密字段不会以明文落盘。
//!
//! 密文格式: `base64(nonce[12] || ciphertext || tag[16])`

use aes_gcm::{Aes256Gcm, AeadCore, KeyInit, Nonce, aead::Aead, aead::OsRng};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// 未配置基础密钥时使用的默认密钥
pub const DEFAULT_AES_KEY: &str = "aes_key";

/// 脱敏控件对外展示的掩码
pub const DESENSITIZE_MASK: &str = "******";

const NONCE_SIZE: usize = 12;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("[{field}] 加密失败")]
    Encrypt { field: String },

    #[error("[{field}] 解密失败: {reason}")]
    Decrypt { field: String, reason: String },

    #[error("字段值序列化失败: {0}")]
    Json(#[from] serde_json::Error),
}

/// 单个字段的加密器
#[derive(Clone)]
pub struct FieldEncryptor {
    field: String,
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for FieldEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldEncryptor")
            .field("field", &self.field)
            .finish_non_exhaustive()
    }
}

impl FieldEncryptor {
    /// 为字段派生加密器
    pub fn for_field(secret: &str, field_key: &str) -> Result<Self, CryptoError> {
        let secret = if secret.is_empty() {
            tracing::debug!(field = field_key, "未配置加密密钥，使用默认密钥");
            DEFAULT_AES_KEY
        } else {
            secret
        };
        let digest = Sha256::digest(format!("{secret}_{field_key}").as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&digest).map_err(|_| CryptoError::Encrypt {
            field: field_key.to_string(),
        })?;
        Ok(Self {
            field: field_key.to_string(),
            cipher,
        })
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    /// 加密字段值
    pub fn encrypt_json(&self, value: &JsonValue) -> Result<String, CryptoError> {
        let plaintext = serde_json::to_vec(value)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let sealed = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| CryptoError::Encrypt {
                field: self.field.clone(),
            })?;

        let mut combined = nonce.to_vec();
        combined.extend_from_slice(&sealed);
        Ok(BASE64.encode(combined))
    }

    /// 解密 [`encrypt_json`](Self::encrypt_json) 的结果
    pub fn decrypt_json(&self, ciphertext: &str) -> Result<JsonValue, CryptoError> {
        let combined = BASE64
            .decode(ciphertext)
            .map_err(|e| self.decrypt_error(format!("base64 解码失败: {e}")))?;
        if combined.len() <= NONCE_SIZE {
            return Err(self.decrypt_error(format!("密文过短: {} 字节", combined.len())));
        }

        let (nonce, sealed) = combined.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| self.decrypt_error("密文损坏或密钥不匹配".to_string()))?;
        Ok(serde_json::from_slice(&plaintext)?)
    }

    fn decrypt_error(&self, reason: String) -> CryptoError {
        CryptoError::Decrypt {
            field: self.field.clone(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn const_value(raw: &str) -> JsonValue {
        json!({"type": "const", "const_value": [{"type": "input", "value": raw}]})
    }

    #[test]
    fn test_field_value_roundtrip() {
        let encryptor = FieldEncryptor::for_field("base-secret", "address").unwrap();
        let value = const_value("北京市朝阳区");

        let cipher = encryptor.encrypt_json(&value).unwrap();
        assert!(!cipher.contains("北京市"));
        assert_eq!(encryptor.decrypt_json(&cipher).unwrap(), value);
    }

    #[test]
    fn test_same_value_encrypts_differently() {
        let encryptor = FieldEncryptor::for_field("base-secret", "token").unwrap();
        let value = const_value("t0ken");

        let c1 = encryptor.encrypt_json(&value).unwrap();
        let c2 = encryptor.encrypt_json(&value).unwrap();
        assert_ne!(c1, c2);
        assert_eq!(encryptor.decrypt_json(&c2).unwrap(), value);
    }

    #[test]
    fn test_cipher_bound_to_field_and_secret() {
        let pwd = FieldEncryptor::for_field("base-secret", "pwd").unwrap();
        let cipher = pwd.encrypt_json(&const_value("123456")).unwrap();

        let other_field = FieldEncryptor::for_field("base-secret", "token").unwrap();
        let err = other_field.decrypt_json(&cipher).unwrap_err();
        assert!(err.to_string().starts_with("[token] 解密失败"));

        let other_secret = FieldEncryptor::for_field("another", "pwd").unwrap();
        assert!(other_secret.decrypt_json(&cipher).is_err());
    }

    #[test]
    fn test_empty_secret_uses_default_key() {
        let encryptor = FieldEncryptor::for_field("", "pwd").unwrap();
        let cipher = encryptor.encrypt_json(&const_value("TOPSECRET")).unwrap();
        assert!(!cipher.contains("TOPSECRET"));

        // 与显式使用默认密钥等价
        let explicit = FieldEncryptor::for_field(DEFAULT_AES_KEY, "pwd").unwrap();
        assert_eq!(explicit.decrypt_json(&cipher).unwrap(), const_value("TOPSECRET"));
    }

    #[test]
    fn test_malformed_cipher_rejected() {
        let encryptor = FieldEncryptor::for_field("base-secret", "k").unwrap();
        assert!(encryptor.decrypt_json("not-valid-base64!!!").is_err());
        assert!(encryptor.decrypt_json(&BASE64.encode([0u8; NONCE_SIZE])).is_err());

        let cipher = encryptor.encrypt_json(&json!("v")).unwrap();
        let mut bytes = BASE64.decode(&cipher).unwrap();
        if let Some(last) = bytes.last_mut() {
            *last ^= 0xFF;
        }
        assert!(encryptor.decrypt_json(&BASE64.encode(&bytes)).is_err());
    }
}
