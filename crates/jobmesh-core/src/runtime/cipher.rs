// jobmesh-core/src/runtime/cipher.rs
// ============================================================================
// Module: Jobmesh Secret Cipher
// Description: AES-256-GCM encryption of tenant secrets under an app key.
// Purpose: Keep secret values encrypted at rest in every repository.
// Dependencies: aes-gcm, rand, crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`AesGcmCipher`] derives its 256-bit key from the first
//! [`APP_KEY_LEN`] bytes of the configured app key. Each encryption draws a
//! fresh 96-bit nonce from the OS RNG and emits `nonce || ciphertext || tag`.
//! Decryption rejects truncated or tampered input with an internal error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use aes_gcm::Aes256Gcm;
use aes_gcm::Nonce;
use aes_gcm::aead::Aead;
use aes_gcm::aead::KeyInit;
use rand::RngCore;
use rand::rngs::OsRng;

use crate::core::DomainError;
use crate::core::errors::ENTITY_SECRET;
use crate::interfaces::SecretCipher;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Bytes of the app key used as the AES-256 key.
pub const APP_KEY_LEN: usize = 32;
/// GCM nonce length in bytes.
const NONCE_LEN: usize = 12;
/// GCM tag length in bytes.
const TAG_LEN: usize = 16;

// ============================================================================
// SECTION: Cipher
// ============================================================================

/// AES-256-GCM secret cipher keyed by the registry app key.
#[derive(Clone)]
pub struct AesGcmCipher {
    /// Keyed AEAD instance.
    aead: Aes256Gcm,
}

impl fmt::Debug for AesGcmCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmCipher").finish_non_exhaustive()
    }
}

impl AesGcmCipher {
    /// Builds a cipher from an app key of at least [`APP_KEY_LEN`] bytes.
    ///
    /// Bytes past [`APP_KEY_LEN`] are ignored.
    ///
    /// # Errors
    ///
    /// Returns invalid argument when the key is too short.
    pub fn new(app_key: &str) -> Result<Self, DomainError> {
        let Some(key) = app_key.as_bytes().get(..APP_KEY_LEN) else {
            return Err(DomainError::invalid_argument(
                ENTITY_SECRET,
                format!("app key must be at least {APP_KEY_LEN} bytes"),
            ));
        };
        let aead = Aes256Gcm::new_from_slice(key)
            .map_err(|_| DomainError::invalid_argument(ENTITY_SECRET, "app key rejected"))?;
        Ok(Self { aead })
    }
}

impl SecretCipher for AesGcmCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, DomainError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let sealed = self
            .aead
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| DomainError::internal(ENTITY_SECRET, "secret encryption failed"))?;
        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(out)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, DomainError> {
        if ciphertext.len() < NONCE_LEN + TAG_LEN {
            return Err(DomainError::internal(ENTITY_SECRET, "malformed ciphertext"));
        }
        let (nonce, sealed) = ciphertext.split_at(NONCE_LEN);
        self.aead
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| DomainError::internal(ENTITY_SECRET, "secret decryption failed"))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
