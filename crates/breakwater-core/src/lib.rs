//! # Breakwater Core
//!
//! Shared foundation for the Breakwater health engine:
//! - The [`Error`] type used across all crates
//! - The [`Result`] alias

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod error;

pub use error::{Error, Result};
