//! Durable storage collaborators.
//!
//! - [`ObjectStore`] - artifact upload returning a public link
//! - [`DocumentStore`] - per-record merge-update of status fields
//!
//! Both are traits so the pipeline can run against local, remote or fake
//! backends.

mod document_store;
mod object_store;

pub use document_store::{
    DocumentFields, DocumentStore, DocumentStoreError, MemoryDocumentStore, SqliteDocumentStore,
    merge_fields,
};
pub use object_store::{
    DEFAULT_PUBLIC_BASE_URL, GcsObjectStore, LocalObjectStore, ObjectStore, StorageError,
    UploadedObject,
};
