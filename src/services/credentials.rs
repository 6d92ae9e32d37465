// src/services/credentials.rs
use async_trait::async_trait;

/// Host capability for selecting or refreshing the API credential.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn is_ready(&self) -> bool;

    /// Ask the host to (re)select a credential. Returns whether one is now
    /// available.
    async fn refresh(&self) -> bool;
}

/// Used when the host has no credential flow: never blocks, never refreshes.
pub struct AlwaysReady;

#[async_trait]
impl CredentialProvider for AlwaysReady {
    async fn is_ready(&self) -> bool {
        true
    }

    async fn refresh(&self) -> bool {
        true
    }
}
