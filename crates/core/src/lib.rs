//! Core domain types and shared logic for the Nimbus storage API.
//!
//! This crate defines the data model used across all other crates:
//! - File and folder entities and the tree built from flat object keys
//! - Typed session claims
//! - Application configuration

pub mod config;
pub mod error;
pub mod session;
pub mod tree;

pub use error::{Error, Result};
pub use session::SessionClaims;
pub use tree::{File, FileItem, Folder, FolderTimestamps, PathTree};

/// Path separator used in object keys.
pub const KEY_DELIMITER: char = '/';
