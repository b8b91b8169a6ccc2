//! Challenge/response credential computation
//!
//! Both PBX protocols (the HTTPS API used for click-to-dial and the
//! websocket event subscription) authenticate the same way: the server hands
//! out a nonce and the client answers with an MD5 digest built from the nonce
//! and the shared secret. Only the message shapes differ, so the hashing rule
//! lives here once.

use crate::models::Credential;
use serde::Deserialize;

/// How the secret and the challenge are combined into the response token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DigestScheme {
    /// `md5_hex(md5_hex(secret) + challenge)`
    #[default]
    Chained,
    /// `md5_hex(challenge + secret)`, accepted by older UCM firmware
    Concatenated,
}

/// Stateless challenge/response helper
#[derive(Debug, Clone, Copy, Default)]
pub struct ChallengeAuthenticator {
    scheme: DigestScheme,
}

impl ChallengeAuthenticator {
    pub fn new(scheme: DigestScheme) -> Self {
        Self { scheme }
    }

    pub fn scheme(&self) -> DigestScheme {
        self.scheme
    }

    /// Compute the response token for `challenge` using `credential`'s secret
    pub fn respond(&self, credential: &Credential, challenge: &str) -> String {
        match self.scheme {
            DigestScheme::Chained => {
                let secret_digest = md5_hex(credential.secret());
                md5_hex(&format!("{}{}", secret_digest, challenge))
            }
            DigestScheme::Concatenated => md5_hex(&format!("{}{}", challenge, credential.secret())),
        }
    }
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}
