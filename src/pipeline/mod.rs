pub mod paths;
pub mod runner;
pub mod series;
pub mod types;

pub use paths::*;
pub use runner::*;
pub use series::*;
pub use types::*;
