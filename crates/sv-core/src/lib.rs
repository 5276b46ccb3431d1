//! sv-core
//!
//! The central domain logic and interface definitions for the solved service.

pub mod eligibility;
pub mod error;
pub mod models;
pub mod solutions;
pub mod traits;

// Re-exporting for easier access in other crates
pub use eligibility::*;
pub use error::*;
pub use models::*;
pub use solutions::*;
pub use traits::*;
