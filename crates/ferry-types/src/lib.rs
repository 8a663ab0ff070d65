//! Types shared between the Ferry engine and the code that configures it.

pub mod config;
pub mod constants;
pub mod error;
