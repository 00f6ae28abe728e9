mod definitions;
pub use definitions::*;

mod output;
pub use output::*;

pub mod loggers;
