//! Persistence of uploaded documents and translation artifacts

pub mod document_store;

pub use document_store::{parse_document_id, sanitize_extension, DocumentStore, StoredDocument};
