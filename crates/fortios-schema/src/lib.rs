//! FortiOS endpoint metadata
//!
//! Data shapes describing the appliance API as emitted by the schema
//! generator: which endpoints exist, which methods they accept, and the
//! fields (types, constraints, enum domains, nested tables) of each.
//!
//! The client runtime consumes these as read-only data; nothing in this
//! crate performs I/O beyond loading catalog documents.

pub mod catalog;
pub mod error;
pub mod field;
pub mod store;

pub use catalog::{Catalog, Category, EndpointEntry, Method};
pub use error::SchemaError;
pub use field::{Constraints, FieldMetadata, FieldType};
pub use store::MetadataStore;
