//! Block and header types (§3).

pub mod types;
