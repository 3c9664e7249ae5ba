//! RedDisc Core Types and Traits
//!
//! This crate provides the fundamental types and traits used throughout RedDisc:
//! - Tenant records and name normalization
//! - Comment events and their parent/submission context
//! - Collaborator traits (config store, comment source, notifier sink)
//! - Tenant administration commands
//! - Core error types

pub mod admin;
pub mod comment;
pub mod config_store;
pub mod error;
pub mod sink;
pub mod source;
pub mod tenant;

pub use config_store::{ConfigSnapshot, ConfigStore, MemoryConfigStore, ModificationMarker};
pub use error::{Error, Result};
pub use tenant::{Tenant, TenantId};
