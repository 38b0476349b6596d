pub mod adaptive;
pub mod classifier;
pub mod consensus;
pub mod exits;
pub mod filters;
pub mod kernel;
pub mod lorentzian;
pub mod regime;
pub mod session;
pub mod strategy;

pub use adaptive::*;
pub use classifier::*;
pub use consensus::*;
pub use exits::*;
pub use filters::*;
pub use kernel::*;
pub use lorentzian::*;
pub use regime::*;
pub use session::*;
pub use strategy::*;
