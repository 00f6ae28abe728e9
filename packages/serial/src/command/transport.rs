mod send_data;

pub use send_data::*;
