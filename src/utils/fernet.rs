use crate::error::{AppError, AppResult};
use aes::Aes128;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
/// Fernet-compatible encryption for session records held in memory
/// Token layout matches Python's cryptography.fernet.Fernet
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::time::current_timestamp_seconds;

type HmacSha256 = Hmac<Sha256>;

const FERNET_VERSION: u8 = 0x80;
const HEADER_LEN: usize = 1 + 8 + 16;
const HMAC_LEN: usize = 32;
const BLOCK_LEN: usize = 16;

pub struct Fernet {
    signing_key: [u8; 16],
    encryption_key: [u8; 16],
}

impl Fernet {
    /// Create a new Fernet instance from a base64url-encoded 32-byte key.
    /// Any other key string is hashed with SHA-256 to derive the 32 bytes.
    pub fn new(key: &str) -> AppResult<Self> {
        let decoded = URL_SAFE_NO_PAD
            .decode(key.trim_end_matches('=').as_bytes())
            .ok()
            .filter(|bytes| bytes.len() == 32);

        let key_bytes = match decoded {
            Some(bytes) => bytes,
            None => {
                let mut hasher = Sha256::new();
                hasher.update(key.as_bytes());
                hasher.finalize().to_vec()
            }
        };

        // First half signs, second half encrypts
        let mut signing_key = [0u8; 16];
        let mut encryption_key = [0u8; 16];
        signing_key.copy_from_slice(&key_bytes[0..16]);
        encryption_key.copy_from_slice(&key_bytes[16..32]);

        Ok(Self {
            signing_key,
            encryption_key,
        })
    }

    /// Generate a fresh random key in the canonical base64url form
    pub fn generate_key() -> String {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }

    pub fn encrypt(&self, data: &[u8]) -> AppResult<String> {
        self.encrypt_at(data, current_timestamp_seconds())
    }

    fn encrypt_at(&self, data: &[u8], timestamp: i64) -> AppResult<String> {
        let mut iv = [0u8; 16];
        rand::rng().fill_bytes(&mut iv);

        // PKCS7
        let mut buffer = data.to_vec();
        let padding_len = BLOCK_LEN - (buffer.len() % BLOCK_LEN);
        buffer.extend(std::iter::repeat(padding_len as u8).take(padding_len));

        let mut cipher = cbc::Encryptor::<Aes128>::new(&self.encryption_key.into(), &iv.into());
        use aes::cipher::generic_array::{typenum::U16, GenericArray};
        for chunk in buffer.chunks_exact_mut(BLOCK_LEN) {
            let block: &mut GenericArray<u8, U16> = GenericArray::from_mut_slice(chunk);
            cipher.encrypt_block_mut(block);
        }

        // version | timestamp | iv | ciphertext | hmac
        let mut token = Vec::with_capacity(HEADER_LEN + buffer.len() + HMAC_LEN);
        token.push(FERNET_VERSION);
        token.extend_from_slice(&(timestamp as u64).to_be_bytes());
        token.extend_from_slice(&iv);
        token.extend_from_slice(&buffer);

        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| AppError::Session(format!("HMAC error: {}", e)))?;
        mac.update(&token);
        token.extend_from_slice(&mac.finalize().into_bytes());

        Ok(URL_SAFE_NO_PAD.encode(&token))
    }

    /// Decrypt a token, rejecting it when it is older than `ttl_secs`
    pub fn decrypt_with_ttl(&self, token: &str, ttl_secs: Option<i64>) -> AppResult<Vec<u8>> {
        let token_bytes = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|e| AppError::Session(format!("Invalid token encoding: {}", e)))?;

        if token_bytes.len() < HEADER_LEN + BLOCK_LEN + HMAC_LEN {
            return Err(AppError::Session("Token too short".to_string()));
        }

        if token_bytes[0] != FERNET_VERSION {
            return Err(AppError::Session("Invalid token version".to_string()));
        }

        let ciphertext_end = token_bytes.len() - HMAC_LEN;
        let mut mac = HmacSha256::new_from_slice(&self.signing_key)
            .map_err(|e| AppError::Session(format!("HMAC error: {}", e)))?;
        mac.update(&token_bytes[..ciphertext_end]);
        mac.verify_slice(&token_bytes[ciphertext_end..])
            .map_err(|_| AppError::Session("Invalid token signature".to_string()))?;

        if let Some(ttl) = ttl_secs {
            let mut ts = [0u8; 8];
            ts.copy_from_slice(&token_bytes[1..9]);
            let issued_at = u64::from_be_bytes(ts) as i64;
            if current_timestamp_seconds() - issued_at > ttl {
                return Err(AppError::Session("Token expired".to_string()));
            }
        }

        let mut iv = [0u8; 16];
        iv.copy_from_slice(&token_bytes[9..HEADER_LEN]);

        let mut buffer = token_bytes[HEADER_LEN..ciphertext_end].to_vec();
        if buffer.len() % BLOCK_LEN != 0 {
            return Err(AppError::Session("Invalid ciphertext length".to_string()));
        }

        let mut cipher = cbc::Decryptor::<Aes128>::new(&self.encryption_key.into(), &iv.into());
        use aes::cipher::generic_array::{typenum::U16, GenericArray};
        for chunk in buffer.chunks_exact_mut(BLOCK_LEN) {
            let block: &mut GenericArray<u8, U16> = GenericArray::from_mut_slice(chunk);
            cipher.decrypt_block_mut(block);
        }

        let padding_len = match buffer.last() {
            Some(&p) => p as usize,
            None => return Err(AppError::Session("Invalid ciphertext: empty".to_string())),
        };
        if padding_len == 0 || padding_len > BLOCK_LEN || padding_len > buffer.len() {
            return Err(AppError::Session("Invalid padding".to_string()));
        }
        if buffer[buffer.len() - padding_len..]
            .iter()
            .any(|&b| b as usize != padding_len)
        {
            return Err(AppError::Session("Invalid padding bytes".to_string()));
        }
        buffer.truncate(buffer.len() - padding_len);

        Ok(buffer)
    }

    pub fn encrypt_json<T: serde::Serialize>(&self, data: &T) -> AppResult<String> {
        let json = serde_json::to_vec(data)
            .map_err(|e| AppError::Session(format!("JSON serialization error: {}", e)))?;
        self.encrypt(&json)
    }

    pub fn decrypt_json<T: serde::de::DeserializeOwned>(
        &self,
        token: &str,
        ttl_secs: Option<i64>,
    ) -> AppResult<T> {
        let plaintext = self.decrypt_with_ttl(token, ttl_secs)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| AppError::Session(format!("JSON deserialization error: {}", e)))
    }
}
