//! Scoped, typed state over a versioned key-value store
//!
//! A turn loads each scope it touches once into a [`ScopedState`], reads and
//! writes typed properties against that cache, then calls `save` exactly once
//! at the end of the turn. Shared logs use [`update_property`], which performs
//! an optimistic read-modify-write with version checks.

use crate::db::{Database, PropertyMap};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Attempts made by [`update_property`] before giving up on a contended scope
const MAX_UPDATE_ATTEMPTS: u32 = 32;

#[derive(Debug, Error)]
pub enum StateError {
    #[error("State backend error: {0}")]
    Backend(String),
    #[error("Property {tag} could not be (de)serialized: {source}")]
    Serialization {
        tag: &'static str,
        source: serde_json::Error,
    },
    #[error("Scope {0} kept changing underneath us; update abandoned")]
    Contended(String),
}

impl From<crate::db::DbError> for StateError {
    fn from(e: crate::db::DbError) -> Self {
        StateError::Backend(e.to_string())
    }
}

/// Key identifying one persisted scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScopeKey(String);

impl ScopeKey {
    pub fn conversation(channel_id: &str, conversation_id: &str) -> Self {
        Self(format!("conversation/{channel_id}/{conversation_id}"))
    }

    pub fn user(channel_id: &str, user_id: &str) -> Self {
        Self(format!("user/{channel_id}/{user_id}"))
    }

    /// Scope shared by every conversation (job and channel logs)
    pub fn bot(name: &str) -> Self {
        Self(format!("bot/{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ScopeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A value stored under a fixed type tag inside a scope
pub trait StateProperty: Serialize + DeserializeOwned + Send {
    const TAG: &'static str;
}

/// A scope document with the version it was read at
#[derive(Debug, Clone, Default)]
pub struct VersionedScope {
    /// 0 when the scope has never been written
    pub version: u64,
    pub properties: PropertyMap,
}

/// Persistent key-value backend
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a scope; a missing scope is an empty document at version 0
    async fn load(&self, scope: &ScopeKey) -> Result<VersionedScope, StateError>;

    /// Write a scope. `None` is last-writer-wins; `Some(v)` only writes when
    /// the stored version is still `v` and returns `Ok(None)` otherwise.
    async fn store(
        &self,
        scope: &ScopeKey,
        properties: &PropertyMap,
        expected_version: Option<u64>,
    ) -> Result<Option<u64>, StateError>;
}

#[async_trait]
impl<T: StateStore + ?Sized> StateStore for Arc<T> {
    async fn load(&self, scope: &ScopeKey) -> Result<VersionedScope, StateError> {
        (**self).load(scope).await
    }

    async fn store(
        &self,
        scope: &ScopeKey,
        properties: &PropertyMap,
        expected_version: Option<u64>,
    ) -> Result<Option<u64>, StateError> {
        (**self).store(scope, properties, expected_version).await
    }
}

/// Adapter to use Database as `StateStore`
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl StateStore for DatabaseStore {
    async fn load(&self, scope: &ScopeKey) -> Result<VersionedScope, StateError> {
        Ok(self
            .db
            .load_scope(scope.as_str())?
            .map(|row| VersionedScope {
                version: row.version,
                properties: row.properties,
            })
            .unwrap_or_default())
    }

    async fn store(
        &self,
        scope: &ScopeKey,
        properties: &PropertyMap,
        expected_version: Option<u64>,
    ) -> Result<Option<u64>, StateError> {
        Ok(self
            .db
            .store_scope(scope.as_str(), properties, expected_version)?)
    }
}

fn decode<P: StateProperty>(properties: &PropertyMap) -> Result<Option<P>, StateError> {
    properties
        .get(P::TAG)
        .filter(|value| !value.is_null())
        .map(|value| {
            serde_json::from_value(value.clone()).map_err(|source| StateError::Serialization {
                tag: P::TAG,
                source,
            })
        })
        .transpose()
}

fn encode<P: StateProperty>(value: &P) -> Result<serde_json::Value, StateError> {
    serde_json::to_value(value).map_err(|source| StateError::Serialization {
        tag: P::TAG,
        source,
    })
}

/// Per-turn cache of one scope
#[derive(Debug)]
pub struct ScopedState {
    scope: ScopeKey,
    properties: PropertyMap,
    dirty: bool,
}

impl ScopedState {
    pub async fn load(store: &dyn StateStore, scope: ScopeKey) -> Result<Self, StateError> {
        let loaded = store.load(&scope).await?;
        Ok(Self {
            scope,
            properties: loaded.properties,
            dirty: false,
        })
    }

    pub fn get<P: StateProperty>(&self) -> Result<Option<P>, StateError> {
        decode(&self.properties)
    }

    pub fn get_or_default<P: StateProperty + Default>(&self) -> Result<P, StateError> {
        Ok(self.get()?.unwrap_or_default())
    }

    pub fn set<P: StateProperty>(&mut self, value: &P) -> Result<(), StateError> {
        let encoded = encode(value)?;
        self.properties.insert(P::TAG.to_string(), encoded);
        self.dirty = true;
        Ok(())
    }

    pub fn remove<P: StateProperty>(&mut self) {
        if self.properties.remove(P::TAG).is_some() {
            self.dirty = true;
        }
    }

    /// Write pending changes back to the store (no-op when nothing changed)
    pub async fn save(&mut self, store: &dyn StateStore) -> Result<(), StateError> {
        if !self.dirty {
            return Ok(());
        }
        store.store(&self.scope, &self.properties, None).await?;
        self.dirty = false;
        Ok(())
    }
}

/// Atomically read-modify-write one property of a shared scope.
///
/// `mutate` may run more than once when other writers race us, so it must
/// only depend on the value it is handed.
pub async fn update_property<P, R, F>(
    store: &dyn StateStore,
    scope: &ScopeKey,
    mut mutate: F,
) -> Result<R, StateError>
where
    P: StateProperty + Default,
    F: FnMut(&mut P) -> R + Send,
    R: Send,
{
    for attempt in 1..=MAX_UPDATE_ATTEMPTS {
        let VersionedScope {
            version,
            mut properties,
        } = store.load(scope).await?;
        let mut value: P = decode(&properties)?.unwrap_or_default();
        let result = mutate(&mut value);
        properties.insert(P::TAG.to_string(), encode(&value)?);

        if store.store(scope, &properties, Some(version)).await?.is_some() {
            return Ok(result);
        }
        tracing::debug!(scope = %scope, attempt, "Version conflict, retrying update");
        tokio::task::yield_now().await;
    }
    Err(StateError::Contended(scope.to_string()))
}

/// Read one property of a shared scope without caching
pub async fn read_property<P: StateProperty + Default>(
    store: &dyn StateStore,
    scope: &ScopeKey,
) -> Result<P, StateError> {
    let loaded = store.load(scope).await?;
    Ok(decode(&loaded.properties)?.unwrap_or_default())
}
