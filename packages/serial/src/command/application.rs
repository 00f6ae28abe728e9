mod application_command;
mod application_update;

pub use application_command::*;
pub use application_update::*;
