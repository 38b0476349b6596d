pub mod ensemble;
pub mod features;

pub use ensemble::*;
pub use features::*;
