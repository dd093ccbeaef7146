//! Authorizer (spec §4.5): verifies deployment signatures against a
//! twin-key directory and distinguishes tenant vs. admin operations.
//!
//! Stateless in the sense spec §4.5 describes — all identity state
//! lives behind the injected [`KeyDirectory`] — but keeps a bounded
//! LRU in front of it, mirroring the original daemon's
//! `substrateTwins` cache
//! (`examples/original_source/pkg/provision/auth.go`) so repeated
//! authorizations for the same twin do not re-hit the external
//! directory on every request.

use async_trait::async_trait;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use lru::LruCache;
use parking_lot::Mutex;
use provisiond_types::{DeploymentId, EngineError, SignatureRequirement, TwinId};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// The minimal external collaborator this crate depends on (spec §6:
/// `key-for(twin) -> public-key`). Implementations typically wrap a
/// call to a consensus/identity chain; out of scope here.
#[async_trait]
pub trait KeyDirectory: Send + Sync {
    async fn key_for(&self, twin: TwinId) -> Option<[u8; 32]>;
}

/// Resolves the node's admin twin from a configured farm id. Grounded
/// on the original's `NewSubstrateAdmins`
/// (`examples/original_source/pkg/provision/auth.go`): farm id -> farm
/// record -> twin id, then the twin's key via [`KeyDirectory`].
#[async_trait]
pub trait FarmDirectory: Send + Sync {
    async fn twin_for_farm(&self, farm_id: u32) -> Option<TwinId>;
}

/// A request signed by one or more twins over the canonical bytes of
/// its payload.
pub struct SignedRequest<T> {
    pub payload: T,
    pub signatures: Vec<(TwinId, Vec<u8>)>,
}

impl<T> SignedRequest<T> {
    pub fn new(payload: T) -> Self {
        SignedRequest { payload, signatures: Vec::new() }
    }

    pub fn signed_by(mut self, twin: TwinId, signature: Vec<u8>) -> Self {
        self.signatures.push((twin, signature));
        self
    }
}

pub struct Authorizer {
    keys: Arc<dyn KeyDirectory>,
    farms: Arc<dyn FarmDirectory>,
    admin_farm: u32,
    cache: Mutex<LruCache<TwinId, VerifyingKey>>,
}

impl Authorizer {
    pub fn new(keys: Arc<dyn KeyDirectory>, farms: Arc<dyn FarmDirectory>, admin_farm: u32) -> Self {
        Authorizer {
            keys,
            farms,
            admin_farm,
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(1024).unwrap())),
        }
    }

    async fn resolve_key(&self, twin: TwinId) -> Option<VerifyingKey> {
        if let Some(key) = self.cache.lock().get(&twin).copied() {
            return Some(key);
        }
        let bytes = self.keys.key_for(twin).await?;
        let key = VerifyingKey::from_bytes(&bytes).ok()?;
        self.cache.lock().put(twin, key);
        Some(key)
    }

    /// Verifies that a mutating request over `canonical_bytes` carries
    /// enough valid signatures to satisfy `requirement`'s threshold
    /// (spec §4.5).
    pub async fn authorize_tenant<T>(
        &self,
        requirement: &SignatureRequirement,
        request: &SignedRequest<T>,
        canonical_bytes: &[u8],
    ) -> Result<(), EngineError> {
        let mut valid = 0u32;
        for (twin, sig_bytes) in &request.signatures {
            if !requirement.signers.contains(twin) {
                continue;
            }
            let Some(key) = self.resolve_key(*twin).await else { continue };
            let Ok(sig_array) = <[u8; 64]>::try_from(sig_bytes.as_slice()) else { continue };
            let signature = Signature::from_bytes(&sig_array);
            if key.verify(canonical_bytes, &signature).is_ok() {
                valid += 1;
            }
        }
        if valid >= requirement.threshold {
            Ok(())
        } else {
            Err(EngineError::Unauthorized)
        }
    }

    /// Admin-restricted operations (spec §6's admin-only surface, e.g.
    /// `force-delete`) require the caller twin to be this node's
    /// resolved admin twin. Open Question in spec §9 resolved here:
    /// read-path `get`/`list` never require admin, only mutate
    /// operations do.
    pub async fn authorize_admin(&self, caller: TwinId) -> Result<(), EngineError> {
        let admin_twin = self
            .farms
            .twin_for_farm(self.admin_farm)
            .await
            .ok_or(EngineError::Unauthorized)?;
        if caller == admin_twin {
            Ok(())
        } else {
            Err(EngineError::Unauthorized)
        }
    }

    pub async fn authorize_owner_or_admin(
        &self,
        owner: TwinId,
        caller: TwinId,
        _deployment_id: DeploymentId,
    ) -> Result<(), EngineError> {
        if owner == caller {
            return Ok(());
        }
        self.authorize_admin(caller).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};
    use std::collections::HashMap;

    struct FixedKeys(HashMap<TwinId, [u8; 32]>);

    #[async_trait]
    impl KeyDirectory for FixedKeys {
        async fn key_for(&self, twin: TwinId) -> Option<[u8; 32]> {
            self.0.get(&twin).copied()
        }
    }

    struct FixedFarms(HashMap<u32, TwinId>);

    #[async_trait]
    impl FarmDirectory for FixedFarms {
        async fn twin_for_farm(&self, farm_id: u32) -> Option<TwinId> {
            self.0.get(&farm_id).copied()
        }
    }

    fn signer() -> SigningKey {
        SigningKey::from_bytes(&[7u8; 32])
    }

    #[tokio::test]
    async fn threshold_met_authorizes() {
        let key = signer();
        let mut keys = HashMap::new();
        keys.insert(1u32, key.verifying_key().to_bytes());
        let authorizer = Authorizer::new(
            Arc::new(FixedKeys(keys)),
            Arc::new(FixedFarms(HashMap::new())),
            99,
        );
        let requirement = SignatureRequirement { threshold: 1, signers: vec![1] };
        let payload = b"deployment-bytes".to_vec();
        let signature = key.sign(&payload);
        let request = SignedRequest::new(()).signed_by(1, signature.to_bytes().to_vec());
        assert!(authorizer.authorize_tenant(&requirement, &request, &payload).await.is_ok());
    }

    #[tokio::test]
    async fn threshold_not_met_is_unauthorized() {
        let key = signer();
        let mut keys = HashMap::new();
        keys.insert(1u32, key.verifying_key().to_bytes());
        let authorizer = Authorizer::new(
            Arc::new(FixedKeys(keys)),
            Arc::new(FixedFarms(HashMap::new())),
            99,
        );
        let requirement = SignatureRequirement { threshold: 2, signers: vec![1, 2] };
        let payload = b"deployment-bytes".to_vec();
        let signature = key.sign(&payload);
        let request = SignedRequest::new(()).signed_by(1, signature.to_bytes().to_vec());
        assert_eq!(
            authorizer.authorize_tenant(&requirement, &request, &payload).await,
            Err(EngineError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn admin_resolved_from_farm() {
        let mut farms = HashMap::new();
        farms.insert(7u32, 42u32);
        let authorizer = Authorizer::new(
            Arc::new(FixedKeys(HashMap::new())),
            Arc::new(FixedFarms(farms)),
            7,
        );
        assert!(authorizer.authorize_admin(42).await.is_ok());
        assert!(authorizer.authorize_admin(1).await.is_err());
    }
}
