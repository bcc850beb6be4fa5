//! # Usergate Core
//!
//! Core types, configuration, and input validation for Usergate.
//!
//! This crate provides:
//! - Configuration loading and validation (JSON5 format)
//! - Account roles, statuses, and the session identity
//! - Field validation rules for user-management requests
//! - Pagination parameter parsing

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod pagination;
pub mod types;
pub mod validation;

pub use config::{Config, ConfigError};
pub use pagination::{PageParams, PageRequest, QueryError, SortDirection, SortField};
pub use types::{AccountId, AccountStatus, Identity, Role};
pub use validation::{FieldMessage, Rules, field_messages};

/// Re-export commonly used external types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::types::*;
    pub use crate::validation::Rules;
}
