use std::time::Duration;
use zw_serial::command::{Command, CommandBase, CommandRequest};
use zw_serial::command_raw::CommandRaw;
use zw_core::definitions::NodeId;
use zw_core::encoding::{EncodingResult, serialize_to_vec};

/// The send-queue bands, highest priority first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SendPriority {
    /// Liveness probes
    NoOp = 0,
    /// Network-management frames
    Controller = 1,
    /// Frames for a just-woken sleeper; drained before everything else
    /// addressed to it
    WakeUp = 2,
    /// Normal application requests
    Command = 3,
    /// The background node-query pipeline
    Query = 4,
    /// Periodic value refreshes
    Poll = 5,
}

pub const PRIORITY_COUNT: usize = 6;

/// An outbound frame descriptor: the typed command plus everything the
/// transaction engine and queues need to route, retry and park it.
#[derive(Debug, Clone)]
pub struct Message {
    pub command: Command,
    /// The node this message is for; unspecified for controller-local
    /// commands
    pub target: NodeId,
    pub priority: SendPriority,
    /// The (class id, command) of the application report that answers
    /// this message, where one is expected
    pub expected_cc_report: Option<(u8, u8)>,
    /// Send attempts before the failure policy applies. 0 drops the
    /// message on the first failure, `u8::MAX` retries forever.
    pub max_attempts: u8,
    pub attempts: u8,
    /// Overrides the engine's reply timeout
    pub reply_timeout: Option<Duration>,
    /// The unencapsulated CC bytes for secure messages that still need
    /// the nonce handshake
    pub secure_cc: Option<Vec<u8>>,
    /// Controller-command initiations only wait for the ACK/response; the
    /// callbacks belong to the command's own state machine
    pub controller_command: bool,
    /// Whether this message belongs to its node's current query stage.
    /// The flag travels with the message through wake-up parking and
    /// replay, where the priority band changes.
    pub stage_tracked: bool,
    finalized: Option<CommandRaw>,
}

impl Message {
    pub fn new(command: Command, target: NodeId, priority: SendPriority) -> Self {
        Self {
            command,
            target,
            priority,
            expected_cc_report: None,
            max_attempts: 3,
            attempts: 0,
            reply_timeout: None,
            secure_cc: None,
            controller_command: false,
            stage_tracked: false,
            finalized: None,
        }
    }

    /// A command addressed at the controller itself
    pub fn controller(command: Command, priority: SendPriority) -> Self {
        Self::new(command, NodeId::unspecified(), priority)
    }

    pub fn expecting_cc_report(mut self, cc_id: u8, cc_command: u8) -> Self {
        self.expected_cc_report = Some((cc_id, cc_command));
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u8) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn retry_forever(mut self) -> Self {
        self.max_attempts = u8::MAX;
        self
    }

    pub fn for_controller_command(mut self) -> Self {
        self.controller_command = true;
        self
    }

    pub fn callback_id(&self) -> Option<u8> {
        self.command.callback_id()
    }

    pub fn expects_response(&self) -> bool {
        self.command.expects_response()
    }

    pub fn expects_callback(&self) -> bool {
        !self.controller_command && self.command.expects_callback()
    }

    /// Whether this message still needs a callback id before sending
    pub fn needs_callback_id(&self) -> bool {
        self.command.needs_callback_id() && self.command.callback_id().is_none()
    }

    /// Assigns the callback id and fixes the frame bytes. Idempotent: a
    /// second call returns the same bytes and keeps the first callback id
    /// (retries resend identical frames).
    pub fn finalize(&mut self, callback_id: impl FnOnce() -> u8) -> EncodingResult<&CommandRaw> {
        if self.finalized.is_none() {
            if self.needs_callback_id() {
                self.command.set_callback_id(Some(callback_id()));
            }
            self.finalized = Some(self.command.as_raw()?);
        }
        Ok(self
            .finalized
            .as_ref()
            .expect("finalized frame just inserted"))
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.is_some()
    }

    /// Byte equality that ignores the callback id (and hence the
    /// checksum), so a retried message with a fresh callback id matches
    /// the queued original.
    pub fn wire_eq(&self, other: &Message) -> bool {
        fn comparable(message: &Message) -> EncodingResult<Vec<u8>> {
            let mut command = message.command.clone();
            command.set_callback_id(None);
            let raw = command.as_raw()?;
            serialize_to_vec(&raw)
        }
        match (comparable(self), comparable(other)) {
            (Ok(a), Ok(b)) => {
                // Strip the trailing checksum; zeroed callback ids make the
                // rest comparable
                a.len() == b.len() && a[..a.len() - 1] == b[..b.len() - 1]
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use zw_serial::command::SendDataRequest;
    use zw_core::definitions::NodeId;

    fn send_data(node: u8, cc: &[u8]) -> Message {
        Message::new(
            SendDataRequest::new(NodeId::new(node), cc.to_vec()).into(),
            NodeId::new(node),
            SendPriority::Command,
        )
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut message = send_data(5, &[0x20, 0x02]);
        let first = message.finalize(|| 10).unwrap().clone();
        assert_eq!(message.callback_id(), Some(10));

        // A second finalize must not consume another id or change bytes
        let second = message.finalize(|| 11).unwrap().clone();
        assert_eq!(message.callback_id(), Some(10));
        assert_eq!(first, second);
    }

    #[test]
    fn test_wire_eq_ignores_callback_id() {
        let mut a = send_data(5, &[0x20, 0x02]);
        let mut b = send_data(5, &[0x20, 0x02]);
        a.finalize(|| 10).unwrap();
        b.finalize(|| 42).unwrap();
        assert!(a.wire_eq(&b));

        let c = send_data(5, &[0x20, 0x01, 0xff]);
        assert!(!a.wire_eq(&c));

        let d = send_data(6, &[0x20, 0x02]);
        assert!(!a.wire_eq(&d));
    }
}
