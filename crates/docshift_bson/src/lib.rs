//! # docshift BSON
//!
//! Dynamic BSON-style value model for docshift.
//!
//! This crate provides:
//! - [`Bson`] — a dynamic value covering the BSON scalar and container
//!   types the mapper works with
//! - [`Document`] — an insertion-ordered string-keyed map with dotted-path
//!   access (`a.b.c`), the unit the store traits exchange
//! - [`ObjectId`] — a 12-byte Mongo-style identifier
//! - relaxed extended-JSON interop (`$oid` / `$date` wrappers) for
//!   exporting validators and surfacing values at the boundary
//!
//! Documents travel to the store as structured values; byte-level
//! encoding belongs to the store driver, not to this crate.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod json;
mod oid;
mod value;

pub use document::Document;
pub use error::{BsonError, BsonResult};
pub use oid::ObjectId;
pub use value::Bson;
