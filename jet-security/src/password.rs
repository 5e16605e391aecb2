// Password hashing and verification

use crate::{Result, SecurityError};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier as _, SaltString, rand_core::OsRng,
    },
};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use jet_core::logging::{debug, trace};
use once_cell::sync::OnceCell;
use sha2::{Digest, Sha256};
use std::borrow::Cow;
use std::sync::Arc;

/// bcrypt ignores everything past this many bytes.
const BCRYPT_MAX_INPUT: usize = 72;

/// Longer inputs are reduced to a SHA-256 digest first so no byte is ignored.
fn bcrypt_input(password: &str) -> Cow<'_, str> {
    if password.len() <= BCRYPT_MAX_INPUT {
        Cow::Borrowed(password)
    } else {
        Cow::Owned(STANDARD.encode(Sha256::digest(password.as_bytes())))
    }
}

/// Pluggable hash/verify capability behind a [`PasswordEncoder`].
#[async_trait]
pub trait PasswordAdapter: Send + Sync {
    async fn hash(&self, password: &str) -> Result<String>;

    async fn verify(&self, password: &str, hashed: &str) -> Result<bool>;
}

/// Password hashing algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HashAlgorithm {
    #[default]
    Bcrypt,
    Argon2id,
    Argon2d,
    Argon2i,
}

/// Options for the built-in adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordOptions {
    pub algorithm: HashAlgorithm,
    /// bcrypt work factor; ignored by the Argon2 variants.
    pub cost: u32,
}

impl PasswordOptions {
    pub const DEFAULT_COST: u32 = 10;

    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            cost: Self::DEFAULT_COST,
        }
    }

    pub fn cost(mut self, cost: u32) -> Self {
        self.cost = cost;
        self
    }
}

impl Default for PasswordOptions {
    fn default() -> Self {
        Self::new(HashAlgorithm::Bcrypt)
    }
}

/// bcrypt and Argon2 hashing on the blocking thread pool.
///
/// Verification reads the algorithm from the stored hash, so hashes made
/// with any supported algorithm keep verifying after a switch.
#[derive(Debug, Clone)]
pub struct DefaultPasswordAdapter {
    options: PasswordOptions,
}

impl DefaultPasswordAdapter {
    pub fn new(options: PasswordOptions) -> Result<Self> {
        if options.algorithm == HashAlgorithm::Bcrypt && !(4..=31).contains(&options.cost) {
            return Err(SecurityError::InvalidOptions(format!(
                "bcrypt cost must be between 4 and 31, got {}",
                options.cost
            )));
        }
        Ok(Self { options })
    }

    pub fn options(&self) -> PasswordOptions {
        self.options
    }

    fn hash_blocking(options: PasswordOptions, password: &str) -> Result<String> {
        let variant = match options.algorithm {
            HashAlgorithm::Bcrypt => {
                return bcrypt::hash(bcrypt_input(password).as_bytes(), options.cost)
                    .map_err(|e| SecurityError::PasswordHash(e.to_string()));
            }
            HashAlgorithm::Argon2id => Algorithm::Argon2id,
            HashAlgorithm::Argon2d => Algorithm::Argon2d,
            HashAlgorithm::Argon2i => Algorithm::Argon2i,
        };

        let salt = SaltString::generate(&mut OsRng);
        Argon2::new(variant, Version::V0x13, Params::default())
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| SecurityError::PasswordHash(e.to_string()))
    }

    fn verify_blocking(password: &str, hashed: &str) -> Result<bool> {
        if hashed.starts_with("$2") {
            bcrypt::verify(bcrypt_input(password).as_bytes(), hashed)
                .map_err(|e| SecurityError::PasswordVerify(e.to_string()))
        } else if hashed.starts_with("$argon2") {
            let parsed = PasswordHash::new(hashed)
                .map_err(|e| SecurityError::PasswordVerify(e.to_string()))?;
            Ok(Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok())
        } else {
            Err(SecurityError::PasswordVerify(
                "Unknown hash format".to_string(),
            ))
        }
    }
}

#[async_trait]
impl PasswordAdapter for DefaultPasswordAdapter {
    async fn hash(&self, password: &str) -> Result<String> {
        let options = self.options;
        let password = password.to_string();
        tokio::task::spawn_blocking(move || Self::hash_blocking(options, &password))
            .await
            .map_err(|e| SecurityError::PasswordHash(e.to_string()))?
    }

    async fn verify(&self, password: &str, hashed: &str) -> Result<bool> {
        let password = password.to_string();
        let hashed = hashed.to_string();
        tokio::task::spawn_blocking(move || Self::verify_blocking(&password, &hashed))
            .await
            .map_err(|e| SecurityError::PasswordVerify(e.to_string()))?
    }
}

/// Encodes and checks passwords through a [`PasswordAdapter`].
///
/// The adapter is fixed once set. An encoder created with
/// [`PasswordEncoder::deferred`] fails every call with
/// [`SecurityError::AdapterNotInitialized`] until
/// [`PasswordEncoder::initialize`] runs.
pub struct PasswordEncoder {
    adapter: OnceCell<Arc<dyn PasswordAdapter>>,
}

impl PasswordEncoder {
    pub fn new<A: PasswordAdapter + 'static>(adapter: A) -> Self {
        let adapter: Arc<dyn PasswordAdapter> = Arc::new(adapter);
        Self {
            adapter: OnceCell::with_value(adapter),
        }
    }

    /// Encoder over the built-in adapter.
    pub fn with_default(options: PasswordOptions) -> Result<Self> {
        debug!(algorithm = ?options.algorithm, cost = options.cost, "Creating password encoder");
        Ok(Self::new(DefaultPasswordAdapter::new(options)?))
    }

    /// Encoder whose adapter is supplied later.
    pub fn deferred() -> Self {
        Self {
            adapter: OnceCell::new(),
        }
    }

    pub fn initialize<A: PasswordAdapter + 'static>(&self, adapter: A) -> Result<()> {
        let adapter: Arc<dyn PasswordAdapter> = Arc::new(adapter);
        self.adapter
            .set(adapter)
            .map_err(|_| SecurityError::AdapterAlreadyInitialized)?;
        debug!("Password adapter initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.adapter.get().is_some()
    }

    fn adapter(&self) -> Result<&Arc<dyn PasswordAdapter>> {
        self.adapter
            .get()
            .ok_or(SecurityError::AdapterNotInitialized)
    }

    pub async fn encode(&self, password: &str) -> Result<String> {
        trace!("Encoding password");
        self.adapter()?.hash(password).await
    }

    /// Whether `raw_password` hashes to `hashed_password`.
    pub async fn matches(&self, raw_password: &str, hashed_password: &str) -> Result<bool> {
        self.adapter()?.verify(raw_password, hashed_password).await
    }
}

impl Default for PasswordEncoder {
    fn default() -> Self {
        Self::new(DefaultPasswordAdapter {
            options: PasswordOptions::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast(algorithm: HashAlgorithm) -> PasswordEncoder {
        PasswordEncoder::with_default(PasswordOptions::new(algorithm).cost(4)).unwrap()
    }

    #[tokio::test]
    async fn test_bcrypt_round_trip() {
        let encoder = fast(HashAlgorithm::Bcrypt);
        let hash = encoder.encode("test-password-123").await.unwrap();
        assert!(hash.starts_with("$2"));

        assert!(encoder.matches("test-password-123", &hash).await.unwrap());
        assert!(!encoder.matches("wrong-password", &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_bcrypt_checks_bytes_past_72() {
        let encoder = fast(HashAlgorithm::Bcrypt);
        let shared = "a".repeat(72);
        let password = format!("{}correct", shared);
        let hash = encoder.encode(&password).await.unwrap();

        assert!(encoder.matches(&password, &hash).await.unwrap());
        assert!(!encoder.matches(&format!("{}WRONG", shared), &hash).await.unwrap());
        assert!(!encoder.matches(&shared, &hash).await.unwrap());
    }

    #[tokio::test]
    async fn test_argon2_variants() {
        for (algorithm, prefix) in [
            (HashAlgorithm::Argon2id, "$argon2id$"),
            (HashAlgorithm::Argon2d, "$argon2d$"),
            (HashAlgorithm::Argon2i, "$argon2i$"),
        ] {
            let encoder = fast(algorithm);
            let hash = encoder.encode("test-password-456").await.unwrap();
            assert!(hash.starts_with(prefix), "{}", hash);
            assert!(encoder.matches("test-password-456", &hash).await.unwrap());
            assert!(!encoder.matches("wrong-password", &hash).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_verification_detects_algorithm() {
        let bcrypt_hash = fast(HashAlgorithm::Bcrypt).encode("pw").await.unwrap();
        let argon_hash = fast(HashAlgorithm::Argon2id).encode("pw").await.unwrap();

        let verifier = fast(HashAlgorithm::Argon2i);
        assert!(verifier.matches("pw", &bcrypt_hash).await.unwrap());
        assert!(verifier.matches("pw", &argon_hash).await.unwrap());
        assert!(matches!(
            verifier.matches("pw", "plaintext").await,
            Err(SecurityError::PasswordVerify(_))
        ));
    }

    #[tokio::test]
    async fn test_deferred_encoder_requires_adapter() {
        let encoder = PasswordEncoder::deferred();
        assert!(!encoder.is_initialized());
        assert!(matches!(
            encoder.encode("pw").await,
            Err(SecurityError::AdapterNotInitialized)
        ));
        assert!(matches!(
            encoder.matches("pw", "$2b$04$x").await,
            Err(SecurityError::AdapterNotInitialized)
        ));

        let adapter = DefaultPasswordAdapter::new(PasswordOptions::default().cost(4)).unwrap();
        encoder.initialize(adapter.clone()).unwrap();
        assert!(encoder.is_initialized());
        assert!(matches!(
            encoder.initialize(adapter),
            Err(SecurityError::AdapterAlreadyInitialized)
        ));

        let hash = encoder.encode("pw").await.unwrap();
        assert!(encoder.matches("pw", &hash).await.unwrap());
    }

    #[test]
    fn test_invalid_bcrypt_cost() {
        assert!(matches!(
            DefaultPasswordAdapter::new(PasswordOptions::default().cost(2)),
            Err(SecurityError::InvalidOptions(_))
        ));
        assert_eq!(PasswordOptions::default().cost, 10);
        assert_eq!(PasswordOptions::default().algorithm, HashAlgorithm::Bcrypt);
    }
}
