//! Identifier validation for the configurable database object names.

mod identifiers;

pub use identifiers::{escape_identifier, safe_identifier, validate_identifier};
