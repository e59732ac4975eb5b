//! Form domain types for Ringi
//!
//! The dynamic form model: schemas made of sections and fields, the
//! duplicatable-section instance model, and the flat response storage
//! format with tolerant typed decoding.
//!
//! Schemas are immutable once a request references them; new versions
//! replace, never mutate. Responses are flat `(field, group, value)`
//! triples; reconstruction into structured sections lives in
//! `form-engine`.

#![deny(unsafe_code)]

pub mod error;
pub mod response;
pub mod schema;

pub use error::{FormError, FormResult};
pub use response::{FieldValue, RequestId, Response};
pub use schema::{
    DuplicateGroupId, Field, FieldId, FieldOption, FieldType, FormSchema, FormSchemaId, Section,
    SectionId, SectionInstance,
};
