// SBI feature extraction and ICP registration
pub mod icp;
pub mod sbi;
pub mod threshold;

pub use icp::*;
pub use sbi::*;
pub use threshold::*;
