//! Utility functions and helpers.

pub mod http;
pub mod text;

pub use text::{collapse_whitespace, split_name_list};
