//! Device credentials as printed on the fan's label

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha512};
use std::fmt;

const USERNAME_PREFIX: &str = "DYSON-";

/// Username and password for the fan's local MQTT broker
///
/// The broker does not accept the plaintext password; it expects the base64 encoded
/// SHA-512 digest of it, which is derived once at construction.
#[derive(Clone, PartialEq, Eq)]
pub struct FanCredentials {
    username: String,
    password_hashed: String,
}

impl FanCredentials {
    /// Builds credentials from the label values; a leading `DYSON-` on the username is dropped
    pub fn new(username: &str, password: &str) -> Self {
        let username = username
            .strip_prefix(USERNAME_PREFIX)
            .unwrap_or(username)
            .to_string();

        Self {
            username,
            password_hashed: hash_password(password),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Password as presented to the broker
    pub fn password_hashed(&self) -> &str {
        &self.password_hashed
    }
}

impl fmt::Debug for FanCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FanCredentials")
            .field("username", &self.username)
            .field("password_hashed", &"<redacted>")
            .finish()
    }
}

fn hash_password(password: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(password.as_bytes());
    STANDARD.encode(hasher.finalize())
}
