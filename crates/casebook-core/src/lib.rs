pub mod error;
pub mod time_value;
pub mod types;

#[cfg(feature = "fund")]
pub mod fund;

#[cfg(feature = "lbo")]
pub mod lbo;

#[cfg(feature = "venture")]
pub mod venture;

pub use error::CasebookError;
pub use types::*;

/// Standard result type for all casebook boundary operations
pub type CasebookResult<T> = Result<T, CasebookError>;
