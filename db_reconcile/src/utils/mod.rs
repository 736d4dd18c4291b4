//! Utilities shared across the library

pub mod logging;
pub mod naming;

pub use naming::{escape_identifier, get_foreign_key_name, get_index_name, truncate_identifier};
