//! Resource service facade.
//!
//! Single-resource reads and writes, binaries held in object storage,
//! transactions and bulk exports, all scoped to an optional tenant.

use crate::change::BINARY_KIND;
use crate::config::Config;
use crate::coordinator::TransactionCoordinator;
use crate::error::{CoreError, CoreResult};
use crate::export::{ExportManager, ExportRequest, ExportStatusReport, ExportWorkflow};
use crate::keys::{
    binary_object_name, binary_object_prefix, is_binary_id, now_millis, KeyBuilder,
};
use crate::reader::VersionReader;
use crate::types::{
    Operation, Resource, ServiceResponse, TransactionOutcome, TransactionRequest,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;
use verdb_store::{Condition, DocumentStatus, ItemStore, ObjectStorage, StoreError, WriteOp};

/// A binary resource with a presigned URL for its content.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryResponse {
    /// The binary's metadata resource.
    pub resource: Resource,
    /// Presigned upload or download URL of the content.
    pub url: String,
}

/// Facade over the version reader, the coordinator and the collaborators.
pub struct ResourceService {
    store: Arc<dyn ItemStore>,
    config: Config,
    keys: KeyBuilder,
    reader: VersionReader,
    coordinator: TransactionCoordinator,
    objects: Option<Arc<dyn ObjectStorage>>,
    exports: Option<ExportManager>,
}

impl ResourceService {
    /// Creates a service over `store`.
    pub fn new(store: Arc<dyn ItemStore>, config: Config) -> Self {
        Self {
            keys: KeyBuilder::new(config.lease_duration),
            reader: VersionReader::new(Arc::clone(&store)),
            coordinator: TransactionCoordinator::new(Arc::clone(&store), &config),
            store,
            config,
            objects: None,
            exports: None,
        }
    }

    /// Attaches object storage for binary payloads.
    #[must_use]
    pub fn with_object_storage(mut self, objects: Arc<dyn ObjectStorage>) -> Self {
        self.objects = Some(objects);
        self
    }

    /// Attaches the workflow running bulk exports.
    #[must_use]
    pub fn with_export_workflow(mut self, workflow: Arc<dyn ExportWorkflow>) -> Self {
        self.exports = Some(ExportManager::new(workflow, &self.config));
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the transaction coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &TransactionCoordinator {
        &self.coordinator
    }

    /// Reads the current version of a resource.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if it has no readable version.
    pub fn read_resource(&self, kind: &str, id: &str, tenant: Option<&str>) -> CoreResult<ServiceResponse> {
        let item = self
            .reader
            .current_version(&self.config.table_for(tenant), kind, id)?;
        Ok(ServiceResponse::with_resource("Resource found", item.into()))
    }

    /// Reads one exact version of a resource.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::VersionNotFound`] if that version was never written.
    pub fn vread_resource(
        &self,
        kind: &str,
        id: &str,
        version: u64,
        tenant: Option<&str>,
    ) -> CoreResult<ServiceResponse> {
        let item = self
            .reader
            .exact_version(&self.config.table_for(tenant), kind, id, version)?;
        Ok(ServiceResponse::with_resource("Resource found", item.into()))
    }

    /// Creates version 1 of a resource, directly `AVAILABLE`.
    ///
    /// An id is generated when `id` is `None`. Version 1 is only written if
    /// no version 1 exists yet.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AlreadyExists`] if the id already has versions,
    /// [`CoreError::InvalidArgument`] for a binary id containing `_`, or a
    /// store error if the write is rejected otherwise.
    pub fn create_resource(
        &self,
        kind: &str,
        payload: serde_json::Value,
        id: Option<&str>,
        tenant: Option<&str>,
    ) -> CoreResult<ServiceResponse> {
        let table = self.config.table_for(tenant);
        let id = id.map_or_else(|| Uuid::new_v4().to_string(), str::to_string);
        if kind == BINARY_KIND {
            check_binary_id(&id)?;
        }
        let item = self
            .keys
            .new_item(kind, &id, 1, payload, DocumentStatus::Available, Utc::now())?;
        let put = WriteOp::Put {
            item: item.clone(),
            condition: Some(Condition::Missing),
        };
        if let Err(e) = self.store.transact_write(&table, &[put]) {
            if self.store.get_item(&table, &item.key())?.is_some() {
                warn!(kind, id = %id, "create of an existing id rejected");
                return Err(CoreError::AlreadyExists {
                    kind: kind.to_string(),
                    id,
                });
            }
            return Err(e.into());
        }
        info!(kind, id = %id, "resource created");
        Ok(ServiceResponse::with_resource("Resource created", item.into()))
    }

    /// Writes the next version of a resource through a one-entry transaction.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the resource has no readable
    /// version, or [`CoreError::Transaction`] if the transaction rolled back.
    pub fn update_resource(
        &self,
        kind: &str,
        id: &str,
        payload: serde_json::Value,
        tenant: Option<&str>,
    ) -> CoreResult<ServiceResponse> {
        let table = self.config.table_for(tenant);
        self.reader.current_version(&table, kind, id)?;

        let request = TransactionRequest::update(kind, id, payload.clone());
        let results = self
            .coordinator
            .transaction_in(&table, &[request], Instant::now())
            .into_result()?;
        let staged = results
            .into_iter()
            .find(|r| r.operation == Operation::Update)
            .ok_or_else(|| CoreError::system_error("update produced no staging result"))?;

        Ok(ServiceResponse::with_resource(
            "Resource updated",
            Resource {
                id: staged.id,
                resource_kind: staged.resource_kind,
                version: staged.version,
                last_modified: staged.last_modified.unwrap_or_else(Utc::now),
                payload,
            },
        ))
    }

    /// Soft-deletes the current version of a resource.
    ///
    /// Binary resources also lose every stored content version when object
    /// storage is attached.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the resource has no readable
    /// version, or a system error if it is held by a transaction.
    pub fn delete_resource(&self, kind: &str, id: &str, tenant: Option<&str>) -> CoreResult<ServiceResponse> {
        let table = self.config.table_for(tenant);
        let current = self.reader.current_version(&table, kind, id)?;

        let update = self.keys.status_update(
            Some(DocumentStatus::Available),
            DocumentStatus::Deleted,
            id,
            current.version,
            now_millis(),
        )?;
        self.store.update_status(&table, &update).map_err(|e| match e {
            StoreError::ConditionFailed { .. } => CoreError::system_error(format!(
                "{kind}/{id} is held by a transaction. Please try again after {} seconds.",
                self.config.lease_duration.as_secs()
            )),
            other => other.into(),
        })?;

        // Content goes only once the resource itself is deleted.
        if kind == BINARY_KIND && is_binary_id(id) {
            if let Some(objects) = &self.objects {
                let removed = objects.delete_by_prefix(&binary_object_prefix(tenant, id))?;
                info!(id, removed, "deleted binary content");
            }
        }

        Ok(ServiceResponse::ok(format!(
            "Successfully deleted ResourceType: {kind}, Id: {id}, VersionId: {}",
            current.version
        )))
    }

    /// Runs a transaction on the table of `tenant`.
    pub fn transaction(
        &self,
        requests: &[TransactionRequest],
        start: Instant,
        tenant: Option<&str>,
    ) -> TransactionOutcome {
        self.coordinator
            .transaction_in(&self.config.table_for(tenant), requests, start)
    }

    /// Non-atomic bundles are not offered.
    ///
    /// # Errors
    ///
    /// Always returns [`CoreError::NotSupported`].
    pub fn batch(&self, _requests: &[TransactionRequest], _tenant: Option<&str>) -> CoreResult<TransactionOutcome> {
        Err(CoreError::NotSupported { operation: "batch" })
    }

    /// Creates a binary resource and returns where to upload its content.
    ///
    /// Inline `data` is dropped from the payload; content only lives in
    /// object storage. If no upload URL can be issued the resource is deleted
    /// again.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotSupported`] without object storage.
    pub fn create_binary(
        &self,
        payload: serde_json::Value,
        content_type: &str,
        tenant: Option<&str>,
    ) -> CoreResult<BinaryResponse> {
        let objects = self.object_storage()?;
        let payload = binary_metadata(payload, content_type);
        let resource = self
            .create_resource(BINARY_KIND, payload, None, tenant)?
            .resource
            .ok_or_else(|| CoreError::system_error("create returned no resource"))?;

        let name = binary_object_name(tenant, &resource.id, resource.version, extension(content_type));
        match objects.presigned_put_url(&name) {
            Ok(url) => Ok(BinaryResponse { resource, url }),
            Err(e) => {
                warn!(error = %e, id = %resource.id, "cannot issue upload url, removing binary");
                self.delete_resource(BINARY_KIND, &resource.id, tenant)?;
                Err(e.into())
            }
        }
    }

    /// Writes a new version of a binary resource and returns where to upload
    /// its content.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotSupported`] without object storage and
    /// [`CoreError::InvalidArgument`] for an id containing `_`.
    pub fn update_binary(
        &self,
        id: &str,
        payload: serde_json::Value,
        content_type: &str,
        tenant: Option<&str>,
    ) -> CoreResult<BinaryResponse> {
        let objects = self.object_storage()?;
        check_binary_id(id)?;
        let payload = binary_metadata(payload, content_type);
        let resource = self
            .update_resource(BINARY_KIND, id, payload, tenant)?
            .resource
            .ok_or_else(|| CoreError::system_error("update returned no resource"))?;
        let name = binary_object_name(tenant, id, resource.version, extension(content_type));
        let url = objects.presigned_put_url(&name)?;
        Ok(BinaryResponse { resource, url })
    }

    /// Reads a binary resource, current or at `version`, with a download URL.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] if the resource or its content is
    /// missing, [`CoreError::NotSupported`] without object storage and
    /// [`CoreError::InvalidArgument`] for an id containing `_`.
    pub fn read_binary(&self, id: &str, version: Option<u64>, tenant: Option<&str>) -> CoreResult<BinaryResponse> {
        let objects = self.object_storage()?;
        check_binary_id(id)?;
        let response = match version {
            Some(version) => self.vread_resource(BINARY_KIND, id, version, tenant)?,
            None => self.read_resource(BINARY_KIND, id, tenant)?,
        };
        let resource = response
            .resource
            .ok_or_else(|| CoreError::not_found(BINARY_KIND, id))?;
        let content_type = resource
            .payload
            .get("contentType")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("application/octet-stream");
        let name = binary_object_name(tenant, id, resource.version, extension(content_type));
        let url = objects.presigned_get_url(&name).map_err(|e| match e {
            StoreError::ObjectNotFound(_) => CoreError::not_found(BINARY_KIND, id),
            other => other.into(),
        })?;
        Ok(BinaryResponse { resource, url })
    }

    /// Starts a bulk export.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TooManyConcurrentExports`] when throttled and
    /// [`CoreError::NotSupported`] without an export workflow.
    pub fn initiate_export(&self, request: &ExportRequest) -> CoreResult<String> {
        self.export_manager()?.initiate(request)
    }

    /// Returns the status of an export job.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown job.
    pub fn get_export_status(&self, job_id: &str) -> CoreResult<ExportStatusReport> {
        self.export_manager()?.status(job_id)
    }

    /// Requests cancellation of an export job.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ExportNotCancelable`] for a finished job.
    pub fn cancel_export(&self, job_id: &str) -> CoreResult<()> {
        self.export_manager()?.cancel(job_id)
    }

    /// Create guarded by a search query.
    ///
    /// # Errors
    ///
    /// Always returns [`CoreError::NotImplemented`].
    pub fn conditional_create(&self, _kind: &str, _payload: serde_json::Value, _query: &str) -> CoreResult<ServiceResponse> {
        Err(CoreError::NotImplemented { operation: "conditional create" })
    }

    /// Update guarded by a search query.
    ///
    /// # Errors
    ///
    /// Always returns [`CoreError::NotImplemented`].
    pub fn conditional_update(&self, _kind: &str, _payload: serde_json::Value, _query: &str) -> CoreResult<ServiceResponse> {
        Err(CoreError::NotImplemented { operation: "conditional update" })
    }

    /// Partial update.
    ///
    /// # Errors
    ///
    /// Always returns [`CoreError::NotImplemented`].
    pub fn patch(&self, _kind: &str, _id: &str, _patch: serde_json::Value) -> CoreResult<ServiceResponse> {
        Err(CoreError::NotImplemented { operation: "patch" })
    }

    /// Partial update guarded by a search query.
    ///
    /// # Errors
    ///
    /// Always returns [`CoreError::NotImplemented`].
    pub fn conditional_patch(&self, _kind: &str, _patch: serde_json::Value, _query: &str) -> CoreResult<ServiceResponse> {
        Err(CoreError::NotImplemented { operation: "conditional patch" })
    }

    /// Delete by search query.
    ///
    /// # Errors
    ///
    /// Always returns [`CoreError::NotImplemented`].
    pub fn conditional_delete(&self, _kind: &str, _query: &str) -> CoreResult<ServiceResponse> {
        Err(CoreError::NotImplemented { operation: "conditional delete" })
    }

    fn object_storage(&self) -> CoreResult<&Arc<dyn ObjectStorage>> {
        self.objects
            .as_ref()
            .ok_or(CoreError::NotSupported { operation: "binary content" })
    }

    fn export_manager(&self) -> CoreResult<&ExportManager> {
        self.exports
            .as_ref()
            .ok_or(CoreError::NotSupported { operation: "export" })
    }
}

impl std::fmt::Debug for ResourceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceService")
            .field("config", &self.config)
            .field("objects", &self.objects.is_some())
            .field("exports", &self.exports.is_some())
            .finish_non_exhaustive()
    }
}

fn check_binary_id(id: &str) -> CoreResult<()> {
    if is_binary_id(id) {
        Ok(())
    } else {
        Err(CoreError::invalid_argument(format!(
            "binary id must be non-empty and must not contain '_': {id}"
        )))
    }
}

/// Strips inline content from a binary payload and records its content type.
fn binary_metadata(mut payload: serde_json::Value, content_type: &str) -> serde_json::Value {
    if let Some(fields) = payload.as_object_mut() {
        fields.remove("data");
        fields.insert("contentType".to_string(), content_type.into());
    }
    payload
}

/// File extension of a MIME type: its subtype without parameters.
fn extension(content_type: &str) -> &str {
    content_type
        .split(';')
        .next()
        .and_then(|essence| essence.split_once('/'))
        .map(|(_, subtype)| subtype.trim())
        .filter(|subtype| !subtype.is_empty())
        .unwrap_or("bin")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransactionErrorKind;
    use serde_json::json;
    use verdb_store::{InMemoryObjectStorage, InMemoryStore, ItemKey};

    fn service() -> (Arc<InMemoryStore>, ResourceService) {
        let store = Arc::new(InMemoryStore::new());
        let service = ResourceService::new(store.clone(), Config::default());
        (store, service)
    }

    #[test]
    fn create_then_read() {
        let (_, service) = service();
        let created = service
            .create_resource("Patient", json!({ "name": "x" }), None, None)
            .unwrap();
        let resource = created.resource.unwrap();
        assert_eq!(resource.version, 1);

        let read = service.read_resource("Patient", &resource.id, None).unwrap();
        assert_eq!(read.message, "Resource found");
        assert_eq!(read.resource.unwrap().payload, json!({ "name": "x" }));
    }

    #[test]
    fn update_goes_through_a_transaction() {
        let (store, service) = service();
        service.create_resource("Patient", json!({ "v": 1 }), Some("p1"), None).unwrap();

        let updated = service
            .update_resource("Patient", "p1", json!({ "v": 2 }), None)
            .unwrap()
            .resource
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(service.coordinator().stats().committed, 1);

        let old = store.get_item("resource-db", &ItemKey::new("p1", 1)).unwrap().unwrap();
        assert_eq!(old.document_status, DocumentStatus::Deleted);
        let current = service.read_resource("Patient", "p1", None).unwrap().resource.unwrap();
        assert_eq!(current.payload, json!({ "v": 2 }));
    }

    #[test]
    fn update_of_missing_resource_is_not_found() {
        let (store, service) = service();
        let err = service.update_resource("Patient", "nope", json!({}), None).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(store.stats().transact_writes, 0);
    }

    #[test]
    fn update_reports_rolled_back_transaction() {
        let (store, service) = service();
        service.create_resource("Patient", json!({}), Some("p1"), None).unwrap();
        store.fail_transact_write_at(2);

        let err = service.update_resource("Patient", "p1", json!({}), None).unwrap_err();
        assert!(matches!(
            err,
            CoreError::Transaction { kind: TransactionErrorKind::System, .. }
        ));
        assert_eq!(
            service.read_resource("Patient", "p1", None).unwrap().resource.unwrap().version,
            1
        );
    }

    #[test]
    fn delete_is_soft_and_hides_the_resource() {
        let (store, service) = service();
        service.create_resource("Patient", json!({}), Some("p1"), None).unwrap();

        let deleted = service.delete_resource("Patient", "p1", None).unwrap();
        assert_eq!(
            deleted.message,
            "Successfully deleted ResourceType: Patient, Id: p1, VersionId: 1"
        );
        assert!(service.read_resource("Patient", "p1", None).unwrap_err().is_not_found());
        assert!(store.get_item("resource-db", &ItemKey::new("p1", 1)).unwrap().is_some());
        assert!(service.vread_resource("Patient", "p1", 1, None).is_ok());
    }

    #[test]
    fn delete_of_locked_resource_fails() {
        let (store, service) = service();
        service.create_resource("Patient", json!({}), Some("p1"), None).unwrap();
        let keys = KeyBuilder::new(service.config().lease_duration);
        let lock = keys
            .status_update(None, DocumentStatus::Locked, "p1", 1, now_millis())
            .unwrap();
        store.update_status("resource-db", &lock).unwrap();

        let err = service.delete_resource("Patient", "p1", None).unwrap_err();
        assert!(matches!(err, CoreError::Transaction { .. }));
    }

    #[test]
    fn create_of_existing_id_is_rejected() {
        let (store, service) = service();
        service.create_resource("Patient", json!({ "v": 1 }), Some("p1"), None).unwrap();
        service.update_resource("Patient", "p1", json!({ "v": 2 }), None).unwrap();

        let err = service
            .create_resource("Patient", json!({ "v": 3 }), Some("p1"), None)
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists { ref id, .. } if id == "p1"));

        let v1 = store.get_item("resource-db", &ItemKey::new("p1", 1)).unwrap().unwrap();
        assert_eq!(v1.document_status, DocumentStatus::Deleted);
        assert_eq!(v1.payload, json!({ "v": 1 }));
        let available = store
            .items("resource-db")
            .iter()
            .filter(|item| item.document_status == DocumentStatus::Available)
            .count();
        assert_eq!(available, 1);
        let current = service.read_resource("Patient", "p1", None).unwrap().resource.unwrap();
        assert_eq!(current.version, 2);
    }

    #[test]
    fn vread_of_missing_version() {
        let (_, service) = service();
        service.create_resource("Patient", json!({}), Some("p1"), None).unwrap();
        let err = service.vread_resource("Patient", "p1", 7, None).unwrap_err();
        assert!(matches!(err, CoreError::VersionNotFound { version: 7, .. }));
    }

    #[test]
    fn tenants_are_isolated() {
        let (store, service) = service();
        service.create_resource("Patient", json!({}), Some("p1"), Some("acme")).unwrap();
        assert!(service.read_resource("Patient", "p1", None).is_err());
        assert!(service.read_resource("Patient", "p1", Some("acme")).is_ok());
        assert_eq!(store.items("resource-db-acme").len(), 1);
    }

    #[test]
    fn unsupported_and_unimplemented_operations() {
        let (_, service) = service();
        assert!(matches!(service.batch(&[], None), Err(CoreError::NotSupported { .. })));
        assert!(matches!(service.patch("Patient", "p1", json!({})), Err(CoreError::NotImplemented { .. })));
        assert!(matches!(
            service.conditional_delete("Patient", "name=x"),
            Err(CoreError::NotImplemented { .. })
        ));
        assert!(matches!(
            service.get_export_status("job"),
            Err(CoreError::NotSupported { operation: "export" })
        ));
        assert!(matches!(
            service.read_binary("b1", None, None),
            Err(CoreError::NotSupported { .. })
        ));
    }

    #[test]
    fn binary_lifecycle() {
        let (_, service) = service();
        let objects = Arc::new(InMemoryObjectStorage::new("binaries", b"secret"));
        let service = service.with_object_storage(objects.clone());

        let created = service
            .create_binary(json!({ "data": "aGVsbG8=" }), "application/pdf", Some("t1"))
            .unwrap();
        assert!(created.resource.payload.get("data").is_none());
        let id = created.resource.id.clone();
        assert!(created
            .url
            .starts_with(&format!("memory://binaries/t1/{id}_1.pdf?method=PUT")));

        objects
            .upload_object(b"hello", &format!("t1/{id}_1.pdf"), "application/pdf")
            .unwrap();
        let read = service.read_binary(&id, None, Some("t1")).unwrap();
        assert!(read.url.contains("method=GET"));

        service.delete_resource(BINARY_KIND, &id, Some("t1")).unwrap();
        assert!(objects.names().is_empty());
    }

    #[test]
    fn failed_binary_delete_keeps_content() {
        let (store, service) = service();
        let objects = Arc::new(InMemoryObjectStorage::new("binaries", b"secret"));
        let service = service.with_object_storage(objects.clone());
        let id = service
            .create_binary(json!({}), "application/pdf", None)
            .unwrap()
            .resource
            .id;
        objects
            .upload_object(b"hello", &format!("{id}_1.pdf"), "application/pdf")
            .unwrap();
        let lock = KeyBuilder::new(service.config().lease_duration)
            .status_update(None, DocumentStatus::Locked, &id, 1, now_millis())
            .unwrap();
        store.update_status("resource-db", &lock).unwrap();

        let err = service.delete_resource(BINARY_KIND, &id, None).unwrap_err();
        assert!(matches!(err, CoreError::Transaction { .. }));
        assert_eq!(objects.names(), vec![format!("{id}_1.pdf")]);
        assert!(service.read_binary(&id, None, None).is_ok());
    }

    #[test]
    fn read_binary_without_content_is_not_found() {
        let (_, service) = service();
        let service =
            service.with_object_storage(Arc::new(InMemoryObjectStorage::new("binaries", b"secret")));
        let id = service
            .create_binary(json!({}), "application/pdf", None)
            .unwrap()
            .resource
            .id;

        let err = service.read_binary(&id, None, None).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn binary_ids_must_not_contain_the_separator() {
        let (_, service) = service();
        let objects = Arc::new(InMemoryObjectStorage::new("binaries", b"secret"));
        let service = service.with_object_storage(objects.clone());
        service.create_resource(BINARY_KIND, json!({}), Some("abc"), None).unwrap();
        objects.upload_object(b"a", "abc_1.pdf", "application/pdf").unwrap();

        // `abc_x` would share the object prefix of `abc`.
        assert!(matches!(
            service.create_resource(BINARY_KIND, json!({}), Some("abc_x"), None),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(matches!(
            service.read_binary("abc_x", None, None),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(matches!(
            service.update_binary("abc_x", json!({}), "application/pdf", None),
            Err(CoreError::InvalidArgument { .. })
        ));
        assert!(objects.names().iter().all(|name| !name.starts_with("abc_x")));

        // Other kinds keep accepting `_`.
        service.create_resource("Patient", json!({}), Some("abc_x"), None).unwrap();
        service.delete_resource(BINARY_KIND, "abc", None).unwrap();
        assert!(objects.names().is_empty());
    }

    #[test]
    fn extension_of_content_types() {
        assert_eq!(extension("application/pdf"), "pdf");
        assert_eq!(extension("text/plain; charset=utf-8"), "plain");
        assert_eq!(extension("garbage"), "bin");
    }
}
