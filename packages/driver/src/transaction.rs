use crate::message::Message;
use crate::options::Timeouts;
use std::time::{Duration, Instant};
use zw_serial::command::{Command, CommandBase, CommandRequest};
use zw_serial::frame::ControlFlow;

/// The lifecycle of the single in-flight request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    WaitingForAck,
    WaitingForResponse,
    WaitingForCallback,
}

/// Why a transaction step did not succeed
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionFailure {
    AckTimeout,
    Nak,
    Can,
    ResponseTimeout,
    CallbackTimeout,
    /// The module rejected the request (response with a failure flag)
    ResponseNok(Command),
    /// The radio reported a delivery failure (callback with a failure flag)
    CallbackNok(Command),
}

impl TransactionFailure {
    /// Whether resending the identical frame can help. A rejected request
    /// stays rejected; everything else is worth the retry budget.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransactionFailure::ResponseNok(_))
    }
}

/// What a step did with its input
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// The input does not belong to this transaction
    Ignored,
    /// The state advanced; the transaction is still in flight
    Advanced,
    /// The transaction finished; the response, if one was expected
    Completed(Option<Command>),
    /// The step failed; the caller applies the retry/failure policy
    Failed(TransactionFailure),
}

/// One outstanding request: the message, where it is in its lifecycle,
/// and the deadline of the current state. There is at most one of these
/// at any moment.
#[derive(Debug)]
pub struct Transaction {
    pub message: Message,
    pub state: TransactionState,
    pub deadline: Instant,
    /// The response captured while waiting for a subsequent callback
    response: Option<Command>,
}

impl Transaction {
    /// Starts the lifecycle for a message that was just written to the
    /// port
    pub fn start(message: Message, now: Instant, timeouts: &Timeouts) -> Self {
        Self {
            message,
            state: TransactionState::WaitingForAck,
            deadline: now + timeouts.ack,
            response: None,
        }
    }

    fn reply_timeout(&self, timeouts: &Timeouts) -> Duration {
        self.message.reply_timeout.unwrap_or(timeouts.reply)
    }

    /// Handles an ACK/NAK/CAN from the module
    pub fn on_control(
        &mut self,
        control: ControlFlow,
        now: Instant,
        timeouts: &Timeouts,
    ) -> StepOutcome {
        if self.state != TransactionState::WaitingForAck {
            return StepOutcome::Ignored;
        }
        match control {
            ControlFlow::ACK => {
                if self.message.expects_response() {
                    self.state = TransactionState::WaitingForResponse;
                    self.deadline = now + self.reply_timeout(timeouts);
                    StepOutcome::Advanced
                } else if self.message.expects_callback() {
                    self.state = TransactionState::WaitingForCallback;
                    self.deadline = now + self.reply_timeout(timeouts);
                    StepOutcome::Advanced
                } else {
                    StepOutcome::Completed(None)
                }
            }
            ControlFlow::NAK => StepOutcome::Failed(TransactionFailure::Nak),
            ControlFlow::CAN => StepOutcome::Failed(TransactionFailure::Can),
        }
    }

    /// Handles the expiry of the current state's deadline
    pub fn on_timeout(&self) -> StepOutcome {
        StepOutcome::Failed(match self.state {
            TransactionState::WaitingForAck => TransactionFailure::AckTimeout,
            TransactionState::WaitingForResponse => TransactionFailure::ResponseTimeout,
            TransactionState::WaitingForCallback => TransactionFailure::CallbackTimeout,
        })
    }

    /// Offers a decoded command to the transaction. Non-matching commands
    /// are ignored and flow onwards to unsolicited dispatch.
    pub fn on_command(
        &mut self,
        command: &Command,
        now: Instant,
        timeouts: &Timeouts,
    ) -> StepOutcome {
        match self.state {
            TransactionState::WaitingForResponse
                if self.message.command.test_response(command) =>
            {
                if !command.is_ok() {
                    return StepOutcome::Failed(TransactionFailure::ResponseNok(
                        command.clone(),
                    ));
                }
                if self.message.expects_callback() {
                    self.response = Some(command.clone());
                    self.state = TransactionState::WaitingForCallback;
                    self.deadline = now + self.reply_timeout(timeouts);
                    StepOutcome::Advanced
                } else {
                    StepOutcome::Completed(Some(command.clone()))
                }
            }
            TransactionState::WaitingForCallback
                if self.message.command.test_callback(command) =>
            {
                if command.is_ok() {
                    StepOutcome::Completed(Some(command.clone()))
                } else {
                    StepOutcome::Failed(TransactionFailure::CallbackNok(command.clone()))
                }
            }
            _ => StepOutcome::Ignored,
        }
    }

    /// The response captured on the way to a callback, if any
    pub fn take_response(&mut self) -> Option<Command> {
        self.response.take()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::message::SendPriority;
    use zw_core::definitions::{NodeId, TransmitStatus};
    use zw_serial::command::{
        GetSucNodeIdRequest, GetSucNodeIdResponse, SendDataCallback, SendDataRequest,
        SendDataResponse,
    };

    fn timeouts() -> Timeouts {
        Timeouts::default()
    }

    fn send_data_transaction(callback_id: u8) -> Transaction {
        let mut message = Message::new(
            SendDataRequest::new(NodeId::new(5), vec![0x25, 0x02]).into(),
            NodeId::new(5),
            SendPriority::Command,
        );
        message.finalize(|| callback_id).unwrap();
        Transaction::start(message, Instant::now(), &timeouts())
    }

    #[test]
    fn test_full_lifecycle() {
        let now = Instant::now();
        let t = timeouts();
        let mut transaction = send_data_transaction(10);
        assert_eq!(transaction.state, TransactionState::WaitingForAck);

        assert_eq!(
            transaction.on_control(ControlFlow::ACK, now, &t),
            StepOutcome::Advanced
        );
        assert_eq!(transaction.state, TransactionState::WaitingForResponse);

        let response: Command = SendDataResponse { accepted: true }.into();
        assert_eq!(
            transaction.on_command(&response, now, &t),
            StepOutcome::Advanced
        );
        assert_eq!(transaction.state, TransactionState::WaitingForCallback);

        let callback: Command = SendDataCallback {
            callback_id: 10,
            transmit_status: TransmitStatus::Ok,
        }
        .into();
        assert!(matches!(
            transaction.on_command(&callback, now, &t),
            StepOutcome::Completed(Some(_))
        ));
    }

    #[test]
    fn test_nak_is_retryable_failure() {
        let now = Instant::now();
        let t = timeouts();
        let mut transaction = send_data_transaction(10);
        let outcome = transaction.on_control(ControlFlow::NAK, now, &t);
        assert_eq!(outcome, StepOutcome::Failed(TransactionFailure::Nak));
        assert!(TransactionFailure::Nak.is_retryable());
    }

    #[test]
    fn test_wrong_callback_id_ignored() {
        let now = Instant::now();
        let t = timeouts();
        let mut transaction = send_data_transaction(10);
        transaction.on_control(ControlFlow::ACK, now, &t);
        transaction.on_command(&SendDataResponse { accepted: true }.into(), now, &t);

        let wrong: Command = SendDataCallback {
            callback_id: 11,
            transmit_status: TransmitStatus::Ok,
        }
        .into();
        assert_eq!(transaction.on_command(&wrong, now, &t), StepOutcome::Ignored);
        assert_eq!(transaction.state, TransactionState::WaitingForCallback);
    }

    #[test]
    fn test_unrelated_response_ignored() {
        let now = Instant::now();
        let t = timeouts();
        let mut transaction = send_data_transaction(10);
        transaction.on_control(ControlFlow::ACK, now, &t);

        let unrelated: Command = GetSucNodeIdResponse { suc_node_id: None }.into();
        assert_eq!(
            transaction.on_command(&unrelated, now, &t),
            StepOutcome::Ignored
        );
    }

    #[test]
    fn test_no_reply_completes_on_ack() {
        let now = Instant::now();
        let t = timeouts();
        // SendDataAbort-style fire-and-forget
        let message = Message::controller(
            zw_serial::command::SendDataAbortRequest::default().into(),
            SendPriority::Controller,
        );
        let mut transaction = Transaction::start(message, now, &t);
        assert_eq!(
            transaction.on_control(ControlFlow::ACK, now, &t),
            StepOutcome::Completed(None)
        );
    }

    #[test]
    fn test_response_only_completes_without_callback() {
        let now = Instant::now();
        let t = timeouts();
        let message = Message::controller(
            GetSucNodeIdRequest::default().into(),
            SendPriority::Controller,
        );
        let mut transaction = Transaction::start(message, now, &t);
        transaction.on_control(ControlFlow::ACK, now, &t);

        let response: Command = GetSucNodeIdResponse {
            suc_node_id: Some(NodeId::new(1)),
        }
        .into();
        assert!(matches!(
            transaction.on_command(&response, now, &t),
            StepOutcome::Completed(Some(_))
        ));
    }

    #[test]
    fn test_timeout_classification() {
        let now = Instant::now();
        let t = timeouts();
        let mut transaction = send_data_transaction(10);
        assert_eq!(
            transaction.on_timeout(),
            StepOutcome::Failed(TransactionFailure::AckTimeout)
        );
        transaction.on_control(ControlFlow::ACK, now, &t);
        assert_eq!(
            transaction.on_timeout(),
            StepOutcome::Failed(TransactionFailure::ResponseTimeout)
        );
    }

    #[test]
    fn test_rejected_response_not_retryable() {
        let now = Instant::now();
        let t = timeouts();
        let mut transaction = send_data_transaction(10);
        transaction.on_control(ControlFlow::ACK, now, &t);

        let rejected: Command = SendDataResponse { accepted: false }.into();
        match transaction.on_command(&rejected, now, &t) {
            StepOutcome::Failed(failure) => assert!(!failure.is_retryable()),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
