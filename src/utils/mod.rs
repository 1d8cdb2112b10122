//! Utility functions for formatting and upload validation.

pub mod format;
pub mod mime;

// Re-export commonly used functions at module level
pub use format::{contains_ignore_case, format_inventory, format_price, truncate};
