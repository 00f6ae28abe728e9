mod add_node;
mod failed_node;
mod get_node_protocol_info;
mod learn_mode;
mod neighbor_update;
mod network_update;
mod remove_node;
mod request_node_info;
mod routing_info;
mod suc_node_id;

pub use add_node::*;
pub use failed_node::*;
pub use get_node_protocol_info::*;
pub use learn_mode::*;
pub use neighbor_update::*;
pub use network_update::*;
pub use remove_node::*;
pub use request_node_info::*;
pub use routing_info::*;
pub use suc_node_id::*;
