pub mod config;
pub mod error;
pub mod types;

pub use error::{classify, AnymdError, AnymdResult, ApiError, ErrorClass};
