//! Salted scrypt credentials for registrants.
//!
//! A credential never stores the secret. It stores an 8 byte random salt and
//! the 32 byte scrypt key derived from `name ‖ secret`, so a credential only
//! verifies for the exact name it was created with.

use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::error::CoolDnsError;

/// scrypt cost parameter N, as a power of two (N = 16384).
pub const SCRYPT_LOG_N: u8 = 14;
/// scrypt block size parameter.
pub const SCRYPT_R: u32 = 8;
/// scrypt parallelization parameter.
pub const SCRYPT_P: u32 = 1;
/// Length of the derived key in bytes.
pub const KEY_LEN: usize = 32;
/// Length of the random salt in bytes.
pub const SALT_LEN: usize = 8;
/// Minimum secret length, counted in Unicode code points.
pub const MIN_SECRET_CHARS: usize = 8;

/// A registrant's credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    name: String,
    salt: [u8; SALT_LEN],
    key: [u8; KEY_LEN],
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Credential {
    /// Create a new credential for `name` and `secret` with a fresh random salt.
    ///
    /// Fails with [`CoolDnsError::Constraint`] if `name` is empty or `secret`
    /// has fewer than eight code points.
    pub fn create(name: &str, secret: &str) -> Result<Self, CoolDnsError> {
        check_constraints(name, secret)?;

        let mut salt = [0u8; SALT_LEN];
        OsRng.try_fill_bytes(&mut salt)?;

        let key = derive_key(name, secret, &salt)?;
        Ok(Self {
            name: name.to_string(),
            salt,
            key,
        })
    }

    /// Rebuild a persisted credential from its stored parts.
    pub fn from_parts(name: String, salt: &[u8], key: &[u8]) -> Result<Self, CoolDnsError> {
        let salt: [u8; SALT_LEN] = salt.try_into().map_err(|_| CoolDnsError::MalformedRecord {
            key: name.clone(),
            reason: format!("salt is {} bytes, expected {SALT_LEN}", salt.len()),
        })?;
        let key: [u8; KEY_LEN] = key.try_into().map_err(|_| CoolDnsError::MalformedRecord {
            key: name.clone(),
            reason: format!("key is {} bytes, expected {KEY_LEN}", key.len()),
        })?;
        Ok(Self { name, salt, key })
    }

    /// Check whether `name` and `secret` are the pair this credential was created with.
    ///
    /// The derived keys are compared in constant time.
    pub fn verify(&self, name: &str, secret: &str) -> bool {
        match derive_key(name, secret, &self.salt) {
            Ok(key) => bool::from(key[..].ct_eq(&self.key[..])),
            Err(_) => false,
        }
    }

    /// Registrant name, usually the hostname.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stored salt.
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    /// Stored derived key.
    pub fn key(&self) -> &[u8] {
        &self.key
    }
}

fn check_constraints(name: &str, secret: &str) -> Result<(), CoolDnsError> {
    if name.is_empty() {
        return Err(CoolDnsError::Constraint("name must not be empty".to_string()));
    }
    if secret.chars().count() < MIN_SECRET_CHARS {
        return Err(CoolDnsError::Constraint(format!(
            "secret must be at least {MIN_SECRET_CHARS} characters"
        )));
    }
    Ok(())
}

fn derive_key(name: &str, secret: &str, salt: &[u8]) -> Result<[u8; KEY_LEN], CoolDnsError> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN)
        .map_err(|e| CoolDnsError::Kdf(e.to_string()))?;

    let mut input = Vec::with_capacity(name.len() + secret.len());
    input.extend_from_slice(name.as_bytes());
    input.extend_from_slice(secret.as_bytes());

    let mut key = [0u8; KEY_LEN];
    scrypt::scrypt(&input, salt, &params, &mut key).map_err(|e| CoolDnsError::Kdf(e.to_string()))?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_then_verify() {
        let cred = Credential::create("alice.example.", "password123").unwrap();

        assert!(cred.verify("alice.example.", "password123"));
        assert!(!cred.verify("alice.example.", "wrongpass"));
    }

    #[test]
    fn test_renaming_invalidates() {
        let cred = Credential::create("alice.example.", "password123").unwrap();
        assert!(!cred.verify("bob.example.", "password123"));
    }

    #[test]
    fn test_seven_code_points_rejected() {
        // 7 code points but 14 bytes
        let err = Credential::create("a.example.", "ääääääa").unwrap_err();
        assert!(matches!(err, CoolDnsError::Constraint(_)));

        let err = Credential::create("a.example.", "1234567").unwrap_err();
        assert!(matches!(err, CoolDnsError::Constraint(_)));
    }

    #[test]
    fn test_eight_code_points_accepted() {
        let cred = Credential::create("a.example.", "pässwörd").unwrap();
        assert!(cred.verify("a.example.", "pässwörd"));
    }

    #[test]
    fn test_empty_name_rejected() {
        let err = Credential::create("", "password123").unwrap_err();
        assert!(matches!(err, CoolDnsError::Constraint(_)));
    }

    #[test]
    fn test_from_parts_roundtrip_and_lengths() {
        let cred = Credential::create("h.zone.", "password123").unwrap();
        let rebuilt =
            Credential::from_parts(cred.name().to_string(), cred.salt(), cred.key()).unwrap();
        assert_eq!(rebuilt, cred);
        assert!(rebuilt.verify("h.zone.", "password123"));

        let err = Credential::from_parts("h.zone.".to_string(), &[0u8; 7], cred.key()).unwrap_err();
        assert!(matches!(err, CoolDnsError::MalformedRecord { .. }));

        let err =
            Credential::from_parts("h.zone.".to_string(), cred.salt(), &[0u8; 16]).unwrap_err();
        assert!(matches!(err, CoolDnsError::MalformedRecord { .. }));
    }

    #[test]
    fn test_debug_hides_key_material() {
        let cred = Credential::from_parts("h.zone.".to_string(), &[1u8; 8], &[2u8; 32]).unwrap();
        let printed = format!("{cred:?}");
        assert!(printed.contains("h.zone."));
        assert!(!printed.contains("salt"));
    }
}
