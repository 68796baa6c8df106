pub mod classifier;
pub mod errors;
pub mod polling;
pub mod types;
pub mod watcher;

pub use errors::{Error, ErrorCode, ErrorKind, Result};
