use crate::message::{Message, SendPriority};
use crate::notification::ControllerState;
use zw_core::definitions::NodeId;
use zw_serial::command::{
    AddNodeMode, AddNodeStatus, AddNodeToNetworkRequest, Command, RemoveFailedNodeRequest,
    RemoveNodeFromNetworkRequest, RemoveNodeStatus, ReplaceFailedNodeRequest,
    RequestNetworkUpdateRequest, RequestNodeNeighborUpdateRequest, SetLearnModeRequest,
    FAILED_NODE_REMOVED, FAILED_NODE_REPLACE_DONE, FAILED_NODE_REPLACE_WAITING,
    NEIGHBOR_UPDATE_DONE, NEIGHBOR_UPDATE_STARTED,
    NETWORK_UPDATE_DONE, LEARN_MODE_DONE, LEARN_MODE_FAILED,
};

/// The network-management operations an embedder can start
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerCommand {
    AddDevice,
    RemoveDevice,
    HasNodeFailed(NodeId),
    RemoveFailedNode(NodeId),
    ReplaceFailedNode(NodeId),
    RequestNodeNeighborUpdate(NodeId),
    RequestNetworkUpdate,
    /// Put the controller into learn mode for replication
    ReceiveConfiguration,
}

impl ControllerCommand {
    /// The failed-node operations cannot be interrupted mid-flight
    pub fn is_cancellable(&self) -> bool {
        !matches!(
            self,
            ControllerCommand::HasNodeFailed(_)
                | ControllerCommand::RemoveFailedNode(_)
                | ControllerCommand::ReplaceFailedNode(_)
        )
    }

    /// The message that starts this command
    pub fn initial_message(&self) -> Message {
        let command: Command = match self {
            ControllerCommand::AddDevice => {
                AddNodeToNetworkRequest::new(AddNodeMode::Any).into()
            }
            ControllerCommand::RemoveDevice => {
                RemoveNodeFromNetworkRequest::new(zw_serial::command::RemoveNodeMode::Any)
                    .into()
            }
            ControllerCommand::HasNodeFailed(node_id) => {
                zw_serial::command::IsFailedNodeRequest { node_id: *node_id }.into()
            }
            ControllerCommand::RemoveFailedNode(node_id) => {
                RemoveFailedNodeRequest::new(*node_id).into()
            }
            ControllerCommand::ReplaceFailedNode(node_id) => {
                ReplaceFailedNodeRequest::new(*node_id).into()
            }
            ControllerCommand::RequestNodeNeighborUpdate(node_id) => {
                RequestNodeNeighborUpdateRequest::new(*node_id).into()
            }
            ControllerCommand::RequestNetworkUpdate => {
                RequestNetworkUpdateRequest::default().into()
            }
            ControllerCommand::ReceiveConfiguration => SetLearnModeRequest::new(true).into(),
        };
        Message::controller(command, SendPriority::Controller).for_controller_command()
    }

    /// The message that cancels this command, if it can be cancelled
    pub fn stop_message(&self) -> Option<Message> {
        let command: Command = match self {
            ControllerCommand::AddDevice => AddNodeToNetworkRequest::stop().into(),
            ControllerCommand::RemoveDevice => RemoveNodeFromNetworkRequest::stop().into(),
            ControllerCommand::ReceiveConfiguration => {
                SetLearnModeRequest::new(false).into()
            }
            _ => return None,
        };
        Some(Message::controller(command, SendPriority::Controller).for_controller_command())
    }
}

/// What an in-flight controller command did with a callback frame
#[derive(Debug, Clone, PartialEq)]
pub enum CommandProgress {
    /// Not a frame for this command
    Ignored,
    /// An intermediate state; the embedder sees the new ControllerState
    Update(ControllerState),
    /// The command finished. `added_node` carries a node to interrogate.
    Finished {
        state: ControllerState,
        added_node: Option<NodeId>,
        removed_node: Option<NodeId>,
    },
}

/// The sub-state-machine that owns the engine while a network-management
/// command runs. Dongle REQUEST frames drive the transitions.
#[derive(Debug)]
pub struct ActiveControllerCommand {
    pub command: ControllerCommand,
    pub state: ControllerState,
    pub callback_id: Option<u8>,
}

impl ActiveControllerCommand {
    pub fn new(command: ControllerCommand) -> Self {
        Self {
            command,
            state: ControllerState::Waiting,
            callback_id: None,
        }
    }

    fn accepts(&self, callback_id: Option<u8>) -> bool {
        match (self.callback_id, callback_id) {
            (Some(expected), Some(actual)) => expected == actual,
            (None, _) => true,
            (Some(_), None) => false,
        }
    }

    /// Feeds a dongle frame into the state machine
    pub fn handle_command(&mut self, command: &Command) -> CommandProgress {
        match (&self.command, command) {
            (ControllerCommand::AddDevice, Command::AddNodeToNetworkCallback(callback))
                if self.accepts(Some(callback.callback_id)) =>
            {
                match callback.status {
                    AddNodeStatus::LearnReady => {
                        self.state = ControllerState::Waiting;
                        CommandProgress::Update(ControllerState::Waiting)
                    }
                    AddNodeStatus::NodeFound
                    | AddNodeStatus::AddingSlave
                    | AddNodeStatus::AddingController
                    | AddNodeStatus::ProtocolDone => {
                        self.state = ControllerState::InProgress;
                        CommandProgress::Update(ControllerState::InProgress)
                    }
                    AddNodeStatus::Done => {
                        self.state = ControllerState::Completed;
                        CommandProgress::Finished {
                            state: ControllerState::Completed,
                            added_node: callback.node_id.is_valid().then_some(callback.node_id),
                            removed_node: None,
                        }
                    }
                    AddNodeStatus::Failed => CommandProgress::Finished {
                        state: ControllerState::Failed,
                        added_node: None,
                        removed_node: None,
                    },
                }
            }

            (
                ControllerCommand::RemoveDevice,
                Command::RemoveNodeFromNetworkCallback(callback),
            ) if self.accepts(Some(callback.callback_id)) => match callback.status {
                RemoveNodeStatus::LearnReady => {
                    CommandProgress::Update(ControllerState::Waiting)
                }
                RemoveNodeStatus::NodeFound
                | RemoveNodeStatus::RemovingSlave
                | RemoveNodeStatus::RemovingController => {
                    CommandProgress::Update(ControllerState::InProgress)
                }
                RemoveNodeStatus::Done => CommandProgress::Finished {
                    state: ControllerState::Completed,
                    added_node: None,
                    removed_node: callback.node_id.is_valid().then_some(callback.node_id),
                },
                RemoveNodeStatus::Failed => CommandProgress::Finished {
                    state: ControllerState::Failed,
                    added_node: None,
                    removed_node: None,
                },
            },

            (
                ControllerCommand::HasNodeFailed(node_id),
                Command::IsFailedNodeResponse(response),
            ) => CommandProgress::Finished {
                state: if response.failed {
                    ControllerState::NodeFailed
                } else {
                    ControllerState::NodeOk
                },
                added_node: None,
                removed_node: response.failed.then_some(*node_id),
            },

            (
                ControllerCommand::RemoveFailedNode(node_id),
                Command::RemoveFailedNodeCallback(callback),
            ) if self.accepts(Some(callback.callback_id)) => {
                if callback.status == FAILED_NODE_REMOVED {
                    CommandProgress::Finished {
                        state: ControllerState::Completed,
                        added_node: None,
                        removed_node: Some(*node_id),
                    }
                } else {
                    CommandProgress::Finished {
                        state: ControllerState::Failed,
                        added_node: None,
                        removed_node: None,
                    }
                }
            }

            (
                ControllerCommand::ReplaceFailedNode(node_id),
                Command::ReplaceFailedNodeCallback(callback),
            ) if self.accepts(Some(callback.callback_id)) => match callback.status {
                FAILED_NODE_REPLACE_WAITING => {
                    CommandProgress::Update(ControllerState::Waiting)
                }
                FAILED_NODE_REPLACE_DONE => CommandProgress::Finished {
                    state: ControllerState::Completed,
                    added_node: Some(*node_id),
                    removed_node: None,
                },
                _ => CommandProgress::Finished {
                    state: ControllerState::Failed,
                    added_node: None,
                    removed_node: None,
                },
            },

            (
                ControllerCommand::RequestNodeNeighborUpdate(_),
                Command::RequestNodeNeighborUpdateCallback(callback),
            ) if self.accepts(Some(callback.callback_id)) => match callback.status {
                NEIGHBOR_UPDATE_STARTED => CommandProgress::Update(ControllerState::InProgress),
                NEIGHBOR_UPDATE_DONE => CommandProgress::Finished {
                    state: ControllerState::Completed,
                    added_node: None,
                    removed_node: None,
                },
                _ => CommandProgress::Finished {
                    state: ControllerState::Failed,
                    added_node: None,
                    removed_node: None,
                },
            },

            (
                ControllerCommand::RequestNetworkUpdate,
                Command::RequestNetworkUpdateCallback(callback),
            ) if self.accepts(Some(callback.callback_id)) => {
                if callback.status == NETWORK_UPDATE_DONE {
                    CommandProgress::Finished {
                        state: ControllerState::Completed,
                        added_node: None,
                        removed_node: None,
                    }
                } else {
                    CommandProgress::Finished {
                        state: ControllerState::Failed,
                        added_node: None,
                        removed_node: None,
                    }
                }
            }

            (
                ControllerCommand::ReceiveConfiguration,
                Command::SetLearnModeCallback(callback),
            ) if self.accepts(Some(callback.callback_id)) => match callback.status {
                LEARN_MODE_DONE => CommandProgress::Finished {
                    state: ControllerState::Completed,
                    added_node: None,
                    removed_node: None,
                },
                LEARN_MODE_FAILED => CommandProgress::Finished {
                    state: ControllerState::Failed,
                    added_node: None,
                    removed_node: None,
                },
                _ => CommandProgress::Update(ControllerState::InProgress),
            },

            _ => CommandProgress::Ignored,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use zw_serial::command::AddNodeToNetworkCallback;

    fn add_callback(status: AddNodeStatus, node: u8) -> Command {
        AddNodeToNetworkCallback {
            callback_id: 10,
            status,
            node_id: NodeId::new(node),
            node_info: None,
        }
        .into()
    }

    #[test]
    fn test_add_device_sequence() {
        let mut active = ActiveControllerCommand::new(ControllerCommand::AddDevice);
        active.callback_id = Some(10);

        assert_eq!(
            active.handle_command(&add_callback(AddNodeStatus::LearnReady, 0)),
            CommandProgress::Update(ControllerState::Waiting)
        );
        assert_eq!(
            active.handle_command(&add_callback(AddNodeStatus::NodeFound, 0)),
            CommandProgress::Update(ControllerState::InProgress)
        );
        assert_eq!(
            active.handle_command(&add_callback(AddNodeStatus::AddingSlave, 9)),
            CommandProgress::Update(ControllerState::InProgress)
        );
        assert_eq!(
            active.handle_command(&add_callback(AddNodeStatus::ProtocolDone, 9)),
            CommandProgress::Update(ControllerState::InProgress)
        );
        assert_eq!(
            active.handle_command(&add_callback(AddNodeStatus::Done, 9)),
            CommandProgress::Finished {
                state: ControllerState::Completed,
                added_node: Some(NodeId::new(9)),
                removed_node: None,
            }
        );
    }

    #[test]
    fn test_wrong_callback_id_ignored() {
        let mut active = ActiveControllerCommand::new(ControllerCommand::AddDevice);
        active.callback_id = Some(42);
        assert_eq!(
            active.handle_command(&add_callback(AddNodeStatus::Done, 9)),
            CommandProgress::Ignored
        );
    }

    #[test]
    fn test_failed_node_ops_not_cancellable() {
        assert!(!ControllerCommand::RemoveFailedNode(NodeId::new(5)).is_cancellable());
        assert!(!ControllerCommand::HasNodeFailed(NodeId::new(5)).is_cancellable());
        assert!(!ControllerCommand::ReplaceFailedNode(NodeId::new(5)).is_cancellable());
        assert!(ControllerCommand::AddDevice.is_cancellable());
        assert!(ControllerCommand::AddDevice.stop_message().is_some());
        assert!(
            ControllerCommand::RemoveFailedNode(NodeId::new(5))
                .stop_message()
                .is_none()
        );
    }
}
