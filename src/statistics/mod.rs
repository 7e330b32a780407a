pub mod window;
pub mod workload;

pub use window::*;
pub use workload::*;
