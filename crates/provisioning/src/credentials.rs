//! Instance credential generation.
//!
//! Passwords come from the operating system's CSPRNG; nothing here is derived
//! from counters, timestamps or ids.

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use rdpstore_core::{DomainError, DomainResult};

const LOWER: &[u8] = b"abcdefghijkmnopqrstuvwxyz";
const UPPER: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";
const DIGITS: &[u8] = b"23456789";
const SYMBOLS: &[u8] = b"!@#$%^&*-_=+?";
const USERNAME_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

const USERNAME_PREFIX: &str = "rdp-";
const USERNAME_SUFFIX_LEN: usize = 8;
const PASSWORD_LEN: usize = 20;
const MIN_PASSWORD_LEN: usize = 12;

/// Instance password. Never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Password(String);

impl Password {
    /// Wrap a caller-chosen password after checking its strength.
    pub fn parse(raw: impl Into<String>) -> DomainResult<Self> {
        let raw = raw.into();
        if raw.chars().count() < MIN_PASSWORD_LEN {
            return Err(DomainError::validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(DomainError::validation("password must not contain whitespace"));
        }
        let classes = [
            raw.chars().any(|c| c.is_ascii_lowercase()),
            raw.chars().any(|c| c.is_ascii_uppercase()),
            raw.chars().any(|c| c.is_ascii_digit()),
            raw.chars().any(|c| !c.is_ascii_alphanumeric()),
        ];
        if classes.iter().filter(|present| **present).count() < 3 {
            return Err(DomainError::validation(
                "password must mix at least three of: lower case, upper case, digits, symbols",
            ));
        }
        Ok(Self(raw))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Debug for Password {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Login pair for one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: Password,
}

/// Validate a caller-chosen username.
pub fn validate_username(username: &str) -> DomainResult<()> {
    let len = username.len();
    if !(3..=32).contains(&len) {
        return Err(DomainError::validation("username must be 3 to 32 characters"));
    }
    if !username
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-' || b == b'_')
    {
        return Err(DomainError::validation(
            "username may only contain a-z, 0-9, '-' and '_'",
        ));
    }
    Ok(())
}

/// Source of fresh instance credentials.
pub trait CredentialGenerator: Send + Sync {
    fn generate(&self) -> Credentials;
}

/// Generator backed by [`OsRng`].
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRngCredentialGenerator;

impl CredentialGenerator for OsRngCredentialGenerator {
    fn generate(&self) -> Credentials {
        let mut rng = OsRng;

        let suffix: String = (0..USERNAME_SUFFIX_LEN)
            .map(|_| pick(&mut rng, USERNAME_ALPHABET))
            .collect();

        // One of each class first, the rest from the union, then shuffle.
        let all: Vec<u8> = [LOWER, UPPER, DIGITS, SYMBOLS].concat();
        let mut password: Vec<char> = vec![
            pick(&mut rng, LOWER),
            pick(&mut rng, UPPER),
            pick(&mut rng, DIGITS),
            pick(&mut rng, SYMBOLS),
        ];
        while password.len() < PASSWORD_LEN {
            password.push(pick(&mut rng, &all));
        }
        password.shuffle(&mut rng);

        Credentials {
            username: format!("{USERNAME_PREFIX}{suffix}"),
            password: Password(password.into_iter().collect()),
        }
    }
}

fn pick<R: Rng>(rng: &mut R, alphabet: &[u8]) -> char {
    char::from(alphabet[rng.gen_range(0..alphabet.len())])
}
