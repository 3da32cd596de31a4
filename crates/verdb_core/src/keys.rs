//! Storage keys, status updates and new-version items.
//!
//! Everything here is pure: callers pass the current time in, nothing touches
//! the store.

use crate::error::{CoreError, CoreResult};
use crate::status::LEASE_STEALABLE;
use chrono::{DateTime, Utc};
use std::time::Duration;
use verdb_store::{Condition, DocumentStatus, Item, ItemKey, StatusUpdate, WriteOp};

/// Returns the current time in epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Builds keys and conditional writes for versioned items.
#[derive(Debug, Clone, Copy)]
pub struct KeyBuilder {
    lease_ms: i64,
}

impl KeyBuilder {
    /// Creates a key builder whose locks last `lease`.
    #[must_use]
    pub fn new(lease: Duration) -> Self {
        Self {
            lease_ms: i64::try_from(lease.as_millis()).unwrap_or(i64::MAX),
        }
    }

    /// Returns the lease length in milliseconds.
    #[must_use]
    pub const fn lease_ms(&self) -> i64 {
        self.lease_ms
    }

    /// Returns the storage key of `(id, version)`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for an empty id or version 0.
    pub fn item_key(&self, id: &str, version: u64) -> CoreResult<ItemKey> {
        if id.is_empty() {
            return Err(CoreError::invalid_argument("logical id must not be empty"));
        }
        if version == 0 {
            return Err(CoreError::invalid_argument(format!(
                "version of {id} must be positive"
            )));
        }
        Ok(ItemKey::new(id, version))
    }

    /// Builds an update setting `(id, version)` to `new_status`.
    ///
    /// A `LOCKED` target gets a lease ending `lease` after `now_ms`; any other
    /// target gets a lease ending at `now_ms`. When `old_status` is given the
    /// update only applies if the item is in `old_status`, or if its lease has
    /// expired while it is `LOCKED`, `PENDING` or `PENDING_DELETE`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for an invalid key.
    pub fn status_update(
        &self,
        old_status: Option<DocumentStatus>,
        new_status: DocumentStatus,
        id: &str,
        version: u64,
        now_ms: i64,
    ) -> CoreResult<StatusUpdate> {
        let key = self.item_key(id, version)?;
        let lock_expiry_ms = if new_status == DocumentStatus::Locked {
            now_ms.saturating_add(self.lease_ms)
        } else {
            now_ms
        };
        let condition = old_status.map(|old| {
            Condition::AnyOf(vec![
                Condition::StatusIs(old),
                Condition::LeaseExpired {
                    now_ms,
                    statuses: LEASE_STEALABLE.to_vec(),
                },
            ])
        });
        Ok(StatusUpdate {
            key,
            status: new_status,
            lock_expiry_ms,
            condition,
        })
    }

    /// Builds a fresh `PENDING` version for staging.
    ///
    /// The version carries a lease, so a version orphaned by a crashed
    /// transaction can be overwritten once the lease runs out.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for an invalid key.
    pub fn pending_put(
        &self,
        kind: &str,
        id: &str,
        version: u64,
        payload: serde_json::Value,
        now: DateTime<Utc>,
    ) -> CoreResult<WriteOp> {
        let mut item = self.new_item(kind, id, version, payload, DocumentStatus::Pending, now)?;
        item.lock_expiry_ms = now.timestamp_millis().saturating_add(self.lease_ms);
        Ok(WriteOp::Put {
            item,
            condition: Some(Condition::AnyOf(vec![
                Condition::Missing,
                Condition::LeaseExpired {
                    now_ms: now.timestamp_millis(),
                    statuses: vec![DocumentStatus::Pending],
                },
            ])),
        })
    }

    /// Builds an item at `(id, version)` in `status`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for an invalid key.
    pub fn new_item(
        &self,
        kind: &str,
        id: &str,
        version: u64,
        payload: serde_json::Value,
        status: DocumentStatus,
        now: DateTime<Utc>,
    ) -> CoreResult<Item> {
        let key = self.item_key(id, version)?;
        Ok(Item {
            id: key.id,
            version: key.version,
            resource_kind: kind.to_string(),
            payload,
            last_modified: now,
            document_status: status,
            lock_expiry_ms: now.timestamp_millis(),
        })
    }

    /// Builds the compensating delete of a version written by an aborted
    /// transaction.
    ///
    /// Only a version still `PENDING` (or already gone) is removed.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidArgument`] for an invalid key.
    pub fn rollback_delete(&self, id: &str, version: u64) -> CoreResult<WriteOp> {
        Ok(WriteOp::Delete {
            key: self.item_key(id, version)?,
            condition: Some(Condition::AnyOf(vec![
                Condition::Missing,
                Condition::StatusIs(DocumentStatus::Pending),
            ])),
        })
    }
}

/// Returns the object-store name of a binary payload.
///
/// Names are `{id}_{version}.{ext}`, prefixed with `{tenant}/` for tenant
/// data.
#[must_use]
pub fn binary_object_name(tenant: Option<&str>, id: &str, version: u64, ext: &str) -> String {
    match tenant {
        Some(tenant) => format!("{tenant}/{id}_{version}.{ext}"),
        None => format!("{id}_{version}.{ext}"),
    }
}

/// Returns the prefix shared by every binary version of `id`.
///
/// The prefix only isolates `id` when [`is_binary_id`] holds: `abc_` is also
/// a prefix of every object of a binary named `abc_x`.
#[must_use]
pub fn binary_object_prefix(tenant: Option<&str>, id: &str) -> String {
    match tenant {
        Some(tenant) => format!("{tenant}/{id}_"),
        None => format!("{id}_"),
    }
}

/// Returns whether `id` can name a binary: object names use `_` to separate
/// the id from the version, so the id itself must not contain one.
#[must_use]
pub fn is_binary_id(id: &str) -> bool {
    !id.is_empty() && !id.contains('_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> KeyBuilder {
        KeyBuilder::new(Duration::from_secs(35))
    }

    fn item(status: DocumentStatus, lock_expiry_ms: i64) -> Item {
        keys()
            .new_item("Patient", "abc", 1, serde_json::json!({}), status, Utc::now())
            .map(|mut item| {
                item.lock_expiry_ms = lock_expiry_ms;
                item
            })
            .unwrap()
    }

    #[test]
    fn rejects_invalid_keys() {
        assert!(matches!(
            keys().item_key("", 1),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(keys().item_key("abc", 0).is_err());
        assert_eq!(keys().item_key("abc", 2).unwrap(), ItemKey::new("abc", 2));
    }

    #[test]
    fn lock_update_extends_lease() {
        let update = keys()
            .status_update(Some(DocumentStatus::Available), DocumentStatus::Locked, "abc", 1, 1_000)
            .unwrap();
        assert_eq!(update.lock_expiry_ms, 36_000);
        assert_eq!(update.status, DocumentStatus::Locked);
    }

    #[test]
    fn release_update_ends_lease_now() {
        let update = keys()
            .status_update(None, DocumentStatus::Available, "abc", 1, 1_000)
            .unwrap();
        assert_eq!(update.lock_expiry_ms, 1_000);
        assert!(update.condition.is_none());
    }

    #[test]
    fn guarded_update_allows_expected_status_or_expired_lease() {
        let update = keys()
            .status_update(Some(DocumentStatus::Available), DocumentStatus::Locked, "abc", 1, 1_000)
            .unwrap();
        let condition = update.condition.unwrap();

        assert!(condition.holds(Some(&item(DocumentStatus::Available, 5_000))));
        assert!(condition.holds(Some(&item(DocumentStatus::Locked, 999))));
        assert!(condition.holds(Some(&item(DocumentStatus::PendingDelete, 0))));
        assert!(!condition.holds(Some(&item(DocumentStatus::Locked, 1_000))));
        assert!(!condition.holds(Some(&item(DocumentStatus::Deleted, 0))));
        assert!(!condition.holds(None));
    }

    #[test]
    fn rollback_delete_spares_committed_versions() {
        let WriteOp::Delete { condition, .. } = keys().rollback_delete("abc", 2).unwrap() else {
            panic!("expected delete");
        };
        let condition = condition.unwrap();
        assert!(condition.holds(None));
        assert!(condition.holds(Some(&item(DocumentStatus::Pending, 0))));
        assert!(!condition.holds(Some(&item(DocumentStatus::Available, 0))));
    }

    #[test]
    fn pending_put_carries_lease() {
        let now = Utc::now();
        let WriteOp::Put { item, .. } = keys()
            .pending_put("Patient", "abc", 4, serde_json::json!({"a": 1}), now)
            .unwrap()
        else {
            panic!("expected put");
        };
        assert_eq!(item.document_status, DocumentStatus::Pending);
        assert_eq!(item.lock_expiry_ms, now.timestamp_millis() + 35_000);
        assert_eq!(item.version, 4);
    }

    #[test]
    fn binary_names() {
        assert_eq!(binary_object_name(None, "abc", 2, "pdf"), "abc_2.pdf");
        assert_eq!(binary_object_name(Some("t1"), "abc", 2, "pdf"), "t1/abc_2.pdf");
        assert_eq!(binary_object_prefix(Some("t1"), "abc"), "t1/abc_");
    }

    #[test]
    fn binary_ids_exclude_the_version_separator() {
        assert!(is_binary_id("abc"));
        assert!(is_binary_id("6f1c2b7e-94d0-4a51-9d0e-2f0c5e1a7b33"));
        assert!(!is_binary_id("abc_x"));
        assert!(!is_binary_id(""));
        // `abc_` would otherwise cover `abc_x_1.pdf` as well.
        assert!(binary_object_name(None, "abc_x", 1, "pdf").starts_with(&binary_object_prefix(None, "abc")));
    }
}
