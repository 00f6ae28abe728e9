mod controller;
mod driver;
mod node;
mod serial;

pub use controller::*;
pub use driver::*;
pub use node::*;
pub use serial::*;
