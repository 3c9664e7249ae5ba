//! Configuration store trait for the tenant map
//!
//! The `ConfigStore` trait abstracts the durable map from tenant id to tenant
//! record. It has no change notification; callers detect edits by comparing
//! the cheap `last_modified` marker against the one they last saw.
//!
//! Every read returns a full immutable snapshot and every write replaces the
//! whole tenant map. Concurrent writers each own the snapshot they read, so
//! the last writer wins.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::RwLock;

use crate::{
    Result,
    tenant::{Tenant, TenantId},
};

/// Opaque "last modified" marker. Only equality is meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModificationMarker(String);

impl ModificationMarker {
    pub fn new(marker: impl Into<String>) -> Self {
        Self(marker.into())
    }

    /// Marker stamped from the current wall clock
    pub fn now() -> Self {
        Self(chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModificationMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable view of the tenant map at one point in time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigSnapshot {
    /// Tenants ordered by id
    pub tenants: Vec<Tenant>,
    /// Marker of the snapshot
    pub last_modified: ModificationMarker,
}

impl ConfigSnapshot {
    /// Build a snapshot from a tenant map, assigning ids from the keys and
    /// re-normalizing every record
    pub fn from_map(
        tenants: BTreeMap<TenantId, Tenant>,
        last_modified: ModificationMarker,
    ) -> Self {
        let tenants = tenants
            .into_iter()
            .map(|(id, mut tenant)| {
                tenant.id = id;
                tenant.normalized()
            })
            .collect();

        Self {
            tenants,
            last_modified,
        }
    }

    /// Convert back into a tenant map keyed by id
    pub fn into_map(self) -> BTreeMap<TenantId, Tenant> {
        self.tenants.into_iter().map(|t| (t.id.clone(), t)).collect()
    }

    /// Look up a tenant by id
    pub fn tenant(&self, id: &TenantId) -> Option<&Tenant> {
        self.tenants.iter().find(|t| &t.id == id)
    }
}

/// Configuration store trait
///
/// Implementations:
/// - `MemoryConfigStore`: in-process store (tests, ephemeral runs)
/// - `FileConfigStore`: file-based store (see `reddisc-config-file`)
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read the whole tenant map
    ///
    /// # Errors
    /// - `Error::ConfigNotFound` if the store doesn't exist
    /// - `Error::Config` if the store is malformed
    async fn read_all(&self) -> Result<ConfigSnapshot>;

    /// Replace the whole tenant map
    ///
    /// Returns the new marker, which differs from every earlier marker.
    async fn write_all(&self, tenants: Vec<Tenant>) -> Result<ModificationMarker>;

    /// Current modification marker, without reading the tenant map
    async fn last_modified(&self) -> Result<ModificationMarker>;
}

#[derive(Debug, Default)]
struct MemoryState {
    tenants: BTreeMap<TenantId, Tenant>,
    generation: u64,
}

/// In-memory configuration store
///
/// The marker is a generation counter bumped on every write.
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    state: RwLock<MemoryState>,
}

impl MemoryConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with tenants
    pub fn with_tenants(tenants: impl IntoIterator<Item = Tenant>) -> Self {
        let tenants = tenants.into_iter().map(|t| (t.id.clone(), t)).collect();
        Self {
            state: RwLock::new(MemoryState {
                tenants,
                generation: 0,
            }),
        }
    }

    fn marker(generation: u64) -> ModificationMarker {
        ModificationMarker::new(format!("gen-{}", generation))
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn read_all(&self) -> Result<ConfigSnapshot> {
        let state = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(ConfigSnapshot::from_map(
            state.tenants.clone(),
            Self::marker(state.generation),
        ))
    }

    async fn write_all(&self, tenants: Vec<Tenant>) -> Result<ModificationMarker> {
        let mut state = self
            .state
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        state.tenants = tenants.into_iter().map(|t| (t.id.clone(), t)).collect();
        state.generation += 1;
        Ok(Self::marker(state.generation))
    }

    async fn last_modified(&self) -> Result<ModificationMarker> {
        let state = self
            .state
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(Self::marker(state.generation))
    }
}
