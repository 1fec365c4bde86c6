pub mod error;
pub mod model;

pub use error::{ErrorCode, UpliftError};
pub use model::*;
