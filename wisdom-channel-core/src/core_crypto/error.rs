use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Authentication failed or the key is wrong; carries no detail on purpose
    #[error("Decryption failed")]
    Decryption,

    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Nonce length mismatch: expected {expected}, got {actual}")]
    NonceLength { expected: usize, actual: usize },

    #[error("Ciphertext truncated: {len} bytes, need more than {min}")]
    Truncated { len: usize, min: usize },

    #[error("Key agreement failed: {0}")]
    KeyAgreement(String),

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),
}

pub type CryptoResult<T> = Result<T, CryptoError>;
