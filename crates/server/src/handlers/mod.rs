//! HTTP request handlers.

pub mod auth;
pub mod browse;
pub mod health;
pub mod objects;

pub use auth::*;
pub use browse::*;
pub use health::*;
pub use objects::*;
