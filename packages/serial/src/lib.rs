pub mod binding;
pub mod codec;
pub mod command;
pub mod command_raw;
pub mod error;
pub mod frame;
pub mod prelude;
