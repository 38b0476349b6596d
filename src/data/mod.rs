pub mod cache;
pub mod synthetic;

pub use cache::*;
pub use synthetic::*;
