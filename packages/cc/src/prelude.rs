pub use crate::commandclass::{
    CcContext, CcError, CcInfo, CommandClass, Disposition, OutgoingCc, StateKind,
};
pub use crate::registry::create_command_class;
