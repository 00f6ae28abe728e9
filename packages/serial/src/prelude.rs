pub use crate::binding::{SerialBinding, ZWavePort};
pub use crate::command::*;
pub use crate::command_raw::CommandRaw;
pub use crate::frame::{ControlFlow, RawSerialFrame};
