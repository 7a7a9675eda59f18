pub mod api;
pub mod config;
pub mod error;
pub mod ids;
pub mod types;
pub mod url;

pub use error::{AskpageError, Result};
pub use ids::*;
