//! # Utilities Module
//!
//! A collection point for small helpers used across `lib_flotils` that do not
//! belong to a single capability.
//!
//! ## Contained Modules:
//!
//! - **`paths`**: Resolving relative paths against an optional prefix directory,
//!   as done for `settings_file` and `path_prefix` settings.
//! - **`printable`**: Type-name helpers and a `Display` wrapper rendering any
//!   serializable value as `<Type>(key=value, ...)`.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// Joining relative paths onto a prefix directory.
pub mod paths;
/// Readable rendering of serializable values and short type names.
pub mod printable;

pub use paths::join_path_prefix;
pub use printable::{format_fields, short_type_name, Printable};
