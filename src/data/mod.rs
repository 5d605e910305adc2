pub mod loader;
pub mod point_set;
pub mod saver;
pub mod transformer;
pub mod volume;

pub use loader::*;
pub use point_set::*;
pub use saver::*;
pub use transformer::*;
pub use volume::*;
