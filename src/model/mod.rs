//! Alias classification and resolution.

pub mod catalog;
pub mod resolver;

pub use catalog::BaseModelCatalog;
pub use resolver::{validate_alias, AliasResolver};
