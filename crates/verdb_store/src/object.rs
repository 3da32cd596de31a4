//! Binary object storage.
//!
//! Versioned items never embed binary payload bytes; they reference an object
//! held here by name.

use crate::error::{StoreError, StoreResult};
use chrono::{Duration, Utc};
use parking_lot::RwLock;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A store of named binary objects with presigned URL access.
pub trait ObjectStorage: Send + Sync {
    /// Stores `data` under `name`, replacing any existing object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object store cannot be reached.
    fn upload_object(&self, data: &[u8], name: &str, content_type: &str) -> StoreResult<()>;

    /// Reads the object stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ObjectNotFound`] if no such object exists.
    fn read_object(&self, name: &str) -> StoreResult<Vec<u8>>;

    /// Deletes the object stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ObjectNotFound`] if no such object exists.
    fn delete_object(&self, name: &str) -> StoreResult<()>;

    /// Returns a time-limited URL a client can upload `name` to.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL cannot be signed.
    fn presigned_put_url(&self, name: &str) -> StoreResult<String>;

    /// Returns a time-limited URL a client can download `name` from.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ObjectNotFound`] if `name` was never uploaded,
    /// or an error if the URL cannot be signed.
    fn presigned_get_url(&self, name: &str) -> StoreResult<String>;

    /// Deletes every object whose name starts with `prefix`.
    ///
    /// Returns the number of objects removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the object store cannot be reached.
    fn delete_by_prefix(&self, prefix: &str) -> StoreResult<usize>;
}

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: String,
}

/// An in-memory object store that signs URLs with SHA-256.
#[derive(Debug)]
pub struct InMemoryObjectStorage {
    bucket: String,
    secret: Vec<u8>,
    url_ttl: Duration,
    objects: RwLock<BTreeMap<String, StoredObject>>,
}

impl InMemoryObjectStorage {
    /// Creates an empty object store for `bucket`.
    pub fn new(bucket: impl Into<String>, secret: &[u8]) -> Self {
        Self {
            bucket: bucket.into(),
            secret: secret.to_vec(),
            url_ttl: Duration::minutes(5),
            objects: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the names of all stored objects.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.objects.read().keys().cloned().collect()
    }

    /// Returns the content type recorded for `name`.
    #[must_use]
    pub fn content_type(&self, name: &str) -> Option<String> {
        self.objects.read().get(name).map(|o| o.content_type.clone())
    }

    fn sign(&self, method: &str, name: &str) -> String {
        let expires = (Utc::now() + self.url_ttl).timestamp();
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(format!("{method}/{}/{name}/{expires}", self.bucket).as_bytes());
        let signature = format!("{:x}", hasher.finalize());
        format!(
            "memory://{}/{name}?method={method}&expires={expires}&signature={signature}",
            self.bucket
        )
    }
}

impl ObjectStorage for InMemoryObjectStorage {
    fn upload_object(&self, data: &[u8], name: &str, content_type: &str) -> StoreResult<()> {
        self.objects.write().insert(
            name.to_string(),
            StoredObject {
                data: data.to_vec(),
                content_type: content_type.to_string(),
            },
        );
        Ok(())
    }

    fn read_object(&self, name: &str) -> StoreResult<Vec<u8>> {
        self.objects
            .read()
            .get(name)
            .map(|o| o.data.clone())
            .ok_or_else(|| StoreError::ObjectNotFound(name.to_string()))
    }

    fn delete_object(&self, name: &str) -> StoreResult<()> {
        self.objects
            .write()
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::ObjectNotFound(name.to_string()))
    }

    fn presigned_put_url(&self, name: &str) -> StoreResult<String> {
        Ok(self.sign("PUT", name))
    }

    fn presigned_get_url(&self, name: &str) -> StoreResult<String> {
        if !self.objects.read().contains_key(name) {
            return Err(StoreError::ObjectNotFound(name.to_string()));
        }
        Ok(self.sign("GET", name))
    }

    fn delete_by_prefix(&self, prefix: &str) -> StoreResult<usize> {
        let mut objects = self.objects.write();
        let before = objects.len();
        objects.retain(|name, _| !name.starts_with(prefix));
        let removed = before - objects.len();
        tracing::debug!(prefix, removed, "deleted objects by prefix");
        Ok(removed)
    }
}
