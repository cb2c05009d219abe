//! # Domain Module
//!
//! Core domain types for charity ledger synchronization.

pub mod entities;
pub mod errors;
pub mod invariants;
pub mod records;
pub mod snapshot;
pub mod value_objects;

pub use entities::*;
pub use errors::*;
pub use invariants::*;
pub use records::*;
pub use snapshot::*;
pub use value_objects::*;
