mod command_classes;
mod command_type;
mod controller;
mod function_type;
mod ids;
mod node_id;
mod node_info;
mod transmit;
mod update_state;

pub use command_classes::*;
pub use command_type::*;
pub use controller::*;
pub use function_type::*;
pub use ids::*;
pub use node_id::*;
pub use node_info::*;
pub use transmit::*;
pub use update_state::*;
