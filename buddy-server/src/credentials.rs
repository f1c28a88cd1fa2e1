use std::time::{Duration, Instant};

use buddy_common::UserId;
use dashmap::DashMap;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Produces and checks opaque credential hashes. The store never sees plaintext.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> String;
    fn verify(&self, plaintext: &str, hash: &str) -> bool;
}

/// `salt$sha256(salt + plaintext)`, with a fresh random salt per credential.
#[derive(Clone, Debug, Default)]
pub struct SaltedSha256;

impl SaltedSha256 {
    fn digest(salt: &str, plaintext: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(plaintext.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

impl CredentialHasher for SaltedSha256 {
    fn hash(&self, plaintext: &str) -> String {
        let salt = Uuid::new_v4().simple().to_string();
        let digest = Self::digest(&salt, plaintext);
        format!("{salt}${digest}")
    }
    fn verify(&self, plaintext: &str, hash: &str) -> bool {
        match hash.split_once('$') {
            Some((salt, digest)) => Self::digest(salt, plaintext) == digest,
            None => false,
        }
    }
}

pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Bearer tokens handed out at login. A token stops resolving `ttl` after it
/// was issued; expired tokens are dropped on lookup and whenever a new one is
/// issued.
pub struct Sessions {
    tokens: DashMap<String, (UserId, Instant)>,
    ttl: Duration,
}

impl Default for Sessions {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL)
    }
}

impl Sessions {
    pub fn new(ttl: Duration) -> Self {
        Self { tokens: DashMap::new(), ttl }
    }
    pub fn issue(&self, user: UserId) -> String {
        let now = Instant::now();
        self.tokens.retain(|_, (_, issued)| now.duration_since(*issued) < self.ttl);
        let token = Uuid::new_v4().to_string();
        self.tokens.insert(token.clone(), (user, now));
        token
    }
    pub fn resolve(&self, token: &str) -> Option<UserId> {
        let (user, issued) = *self.tokens.get(token)?.value();
        if issued.elapsed() < self.ttl {
            return Some(user);
        }
        self.tokens.remove(token);
        None
    }
    #[cfg(test)]
    fn len(&self) -> usize {
        self.tokens.len()
    }
}
