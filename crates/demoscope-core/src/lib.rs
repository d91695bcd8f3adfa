//! demoscope core library
//!
//! This crate provides the identifier and value types shared across all
//! demoscope components.

pub mod types;

pub use types::*;

/// Re-export commonly used items
pub mod prelude {
    pub use crate::types::*;
}
