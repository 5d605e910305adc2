pub mod algorithms;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod pipeline;

pub use algorithms::*;
pub use data::*;
pub use error::SbiError;

pub type Result<T, E = SbiError> = std::result::Result<T, E>;
