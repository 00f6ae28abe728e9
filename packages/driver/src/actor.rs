use crate::controller_commands::{ActiveControllerCommand, CommandProgress, ControllerCommand};
use crate::driver::DriverInput;
use crate::error::{Error, Result};
use crate::message::{Message, SendPriority};
use crate::node::{Group, Node, QueryStage};
use crate::notification::{
    ControllerState, Notification, NotificationCode, NotificationQueue, WatcherRegistry,
};
use crate::options::DriverOptions;
use crate::poll::PollScheduler;
use crate::send_queue::SendQueue;
use crate::storage::{PersistedNode, PersistedState, SCHEMA_VERSION, StateSerializer};
use crate::transaction::{StepOutcome, Transaction, TransactionFailure};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::mpsc;
use zw_cc::commandclass::{
    CcContext, CommandClass, Disposition, MultiInstanceCc, NoOperationCc, OutgoingCc,
    SecurityCc, StateKind, VersionCc, WakeUpCc,
};
use zw_core::definitions::*;
use zw_core::prelude::Value;
use zw_core::util::MaybeSleep;
use zw_core::value_id::ValueId;
use zw_core::value_store::ValueEvent;
use zw_core::wrapping_counter::WrappingCounter;
use zw_logging::loggers::{ControllerLogger, DriverLogger, NodeLogger, SerialLogger};
use zw_logging::{Direction, LogSink};
use zw_serial::command::{Command, CommandRequest, SendDataRequest};
use zw_serial::command_raw::CommandRaw;
use zw_serial::frame::{ControlFlow, RawSerialFrame};
use zw_core::parse::Parsable;
use zw_core::encoding::IntoEncodingResult;

const DEFAULT_WAKE_UP_INTERVAL_SECS: u32 = 3600;
const WAKE_UP_NO_MORE_INFORMATION_BYTES: [u8; 2] = [0x84, 0x08];

/// Where the driver is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverPhase {
    /// Running the startup identification sequence
    Identifying,
    Ready,
    Failed,
}

/// What the startup sequence learned about the attached module
#[derive(Debug, Default, Clone)]
pub struct ControllerInfo {
    pub home_id: HomeId,
    pub own_node_id: NodeId,
    pub library_version: String,
    pub library_type: Option<LibraryType>,
    pub capabilities: Option<ControllerCapabilities>,
    pub serial_api_version: String,
    pub suc_node_id: Option<NodeId>,
}

/// What the serial task reports to the driver task
#[derive(Debug)]
pub enum SerialEvent {
    Frame(RawSerialFrame),
    /// The port is gone; fatal
    Disconnected,
}

/// A secure message held back until its nonce handshake finishes
struct PendingSecure {
    message: Message,
    deadline: Instant,
}

/// The driver task: owns the transaction engine, the send queue, the node
/// table and the notification queue. Frames come in from the serial task,
/// requests from the embedder through the [Driver](crate::Driver) handle.
pub struct DriverActor {
    options: DriverOptions,
    phase: DriverPhase,
    pub controller: ControllerInfo,
    pub nodes: BTreeMap<NodeId, Node>,
    queue: SendQueue,
    transaction: Option<Transaction>,
    callback_ids: WrappingCounter<u8>,
    active_controller_command: Option<ActiveControllerCommand>,
    pending_secure: Option<PendingSecure>,
    poll: PollScheduler,
    next_poll_at: Instant,
    notifications: NotificationQueue,
    watchers: Arc<WatcherRegistry>,
    serializer: Option<Box<dyn StateSerializer>>,
    restored_nodes: BTreeMap<NodeId, PersistedNode>,
    sink: Arc<dyn LogSink>,
    ready_flag: Arc<AtomicBool>,

    serial_rx: mpsc::Receiver<SerialEvent>,
    serial_tx: mpsc::Sender<RawSerialFrame>,
    input_rx: mpsc::Receiver<DriverInput>,

    awake_queried_notified: bool,
    all_queried_notified: bool,
    exit: bool,
}

impl DriverActor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        options: DriverOptions,
        sink: Arc<dyn LogSink>,
        watchers: Arc<WatcherRegistry>,
        serializer: Option<Box<dyn StateSerializer>>,
        ready_flag: Arc<AtomicBool>,
        serial_rx: mpsc::Receiver<SerialEvent>,
        serial_tx: mpsc::Sender<RawSerialFrame>,
        input_rx: mpsc::Receiver<DriverInput>,
    ) -> Self {
        let poll_interval = options.poll_interval;
        Self {
            options,
            phase: DriverPhase::Identifying,
            controller: ControllerInfo::default(),
            nodes: BTreeMap::new(),
            queue: SendQueue::new(),
            transaction: None,
            // Callback ids live in 10..=255 so they cannot collide with
            // the "no callback" zero or low dongle-internal ids
            callback_ids: WrappingCounter::with_range(10, u8::MAX),
            active_controller_command: None,
            pending_secure: None,
            poll: PollScheduler::new(poll_interval),
            next_poll_at: Instant::now() + poll_interval,
            notifications: NotificationQueue::new(),
            watchers,
            serializer,
            restored_nodes: BTreeMap::new(),
            sink,
            ready_flag,
            serial_rx,
            serial_tx,
            input_rx,
            awake_queried_notified: false,
            all_queried_notified: false,
            exit: false,
        }
    }

    fn driver_log(&self) -> DriverLogger {
        DriverLogger::new(self.sink.clone())
    }

    fn serial_log(&self) -> SerialLogger {
        SerialLogger::new(self.sink.clone())
    }

    fn controller_log(&self) -> ControllerLogger {
        ControllerLogger::new(self.sink.clone())
    }

    fn node_log(&self, node_id: NodeId) -> NodeLogger {
        NodeLogger::new(self.sink.clone(), node_id)
    }

    pub async fn run(&mut self) {
        self.startup();

        while !self.exit {
            // Safe point: between transaction steps, deliver notifications
            self.drain_notifications();
            self.try_send_next();

            let now = Instant::now();
            let transaction_sleep = MaybeSleep::new(
                self.transaction
                    .as_ref()
                    .map(|t| t.deadline.saturating_duration_since(now)),
            );
            let security_sleep = MaybeSleep::new(
                self.pending_secure
                    .as_ref()
                    .map(|p| p.deadline.saturating_duration_since(now)),
            );
            let poll_sleep = tokio::time::sleep(
                self.next_poll_at.saturating_duration_since(now),
            );

            tokio::select! {
                biased;

                event = self.serial_rx.recv() => match event {
                    Some(event) => self.handle_serial_event(event),
                    None => self.fail_driver("serial task ended"),
                },

                input = self.input_rx.recv() => match input {
                    Some(input) => self.handle_input(input),
                    None => self.exit = true,
                },

                _ = transaction_sleep => self.handle_transaction_timeout(),

                _ = security_sleep => self.handle_security_timeout(),

                _ = poll_sleep => self.handle_poll_tick(),
            }
        }

        self.shutdown();
    }

    fn startup(&mut self) {
        let log = self.driver_log();
        log.logo();
        log.info(|| "starting the controller identification sequence");

        // The fixed init sequence; responses populate ControllerInfo and
        // the last one flips the driver to Ready
        use zw_serial::command::*;
        for command in [
            Command::from(GetControllerVersionRequest::default()),
            MemoryGetIdRequest::default().into(),
            GetControllerCapabilitiesRequest::default().into(),
            GetSerialApiCapabilitiesRequest::default().into(),
            GetSerialApiInitDataRequest::default().into(),
            GetSucNodeIdRequest::default().into(),
        ] {
            self.queue
                .enqueue(Message::controller(command, SendPriority::Controller));
        }
    }

    fn shutdown(&mut self) {
        self.persist_state();
        self.notifications.push(Notification::DriverRemoved);
        self.drain_notifications();
        self.driver_log().info(|| "driver shut down");
    }

    fn fail_driver(&mut self, reason: &str) {
        if self.phase == DriverPhase::Failed {
            return;
        }
        let message = reason.to_owned();
        self.driver_log().error(move || message.clone());
        self.phase = DriverPhase::Failed;
        self.ready_flag.store(false, Ordering::SeqCst);
        self.notifications.push(Notification::DriverFailed);
        self.exit = true;
    }

    // ------------------------------------------------------------------
    // Outbound path
    // ------------------------------------------------------------------

    /// Starts the next transaction if the engine is idle and the head of
    /// the queue is sendable
    fn try_send_next(&mut self) {
        while self.transaction.is_none() && self.pending_secure.is_none() {
            let Some(message) = self.queue.dequeue() else {
                return;
            };

            // Awake gating: anything for a sleeping node is parked, with
            // the exception of the probe band
            if message.priority != SendPriority::NoOp
                && let Some(node) = self.nodes.get_mut(&message.target)
                && !node.is_awake()
            {
                if !is_wakeup_no_more_information(&message) {
                    node.wakeup_queue.push_back(message);
                }
                continue;
            }

            // Secure messages first need a nonce from the receiver
            if message.secure_cc.is_some() {
                self.begin_secure_send(message);
                continue;
            }

            self.transmit(message);
            return;
        }
    }

    /// Writes the message to the port and arms the transaction
    fn transmit(&mut self, mut message: Message) {
        let frame = {
            let callback_ids = &mut self.callback_ids;
            match message.finalize(|| callback_ids.increment()) {
                Ok(raw) => RawSerialFrame::from(raw.clone()),
                Err(e) => {
                    self.driver_log()
                        .error(move || format!("failed to serialize message: {}", e));
                    return;
                }
            }
        };
        message.attempts = message.attempts.saturating_add(1);
        self.controller_log()
            .command(&message.command, Direction::Outbound);
        self.send_frame(frame);
        self.transaction = Some(Transaction::start(
            message,
            Instant::now(),
            &self.options.timeouts,
        ));
    }

    fn send_frame(&mut self, frame: RawSerialFrame) {
        if let RawSerialFrame::ControlFlow(byte) = &frame {
            self.serial_log().control_flow(*byte, Direction::Outbound);
        } else {
            self.serial_log().data(frame.as_ref(), Direction::Outbound);
        }
        if self.serial_tx.try_send(frame).is_err() {
            self.fail_driver("serial port went away");
        }
    }

    /// Starts the S0 handshake for a message whose CC payload must be
    /// encrypted: ask the target for a nonce, hold the message until the
    /// report arrives or the handshake times out.
    fn begin_secure_send(&mut self, message: Message) {
        let target = message.target;
        let Some(nonce_get) = self
            .nodes
            .get(&target)
            .and_then(|node| node.classes.get(&(CommandClasses::Security as u8)))
            .map(|_| SecurityCc::new().nonce_get())
        else {
            self.node_log(target)
                .warn(|| "dropping secure message: node has no Security class");
            return;
        };

        self.pending_secure = Some(PendingSecure {
            message,
            deadline: Instant::now() + self.options.timeouts.security,
        });
        let request = Message::new(
            SendDataRequest::new(target, nonce_get.cc_bytes).into(),
            target,
            SendPriority::Controller,
        );
        self.transmit(request);
    }

    fn handle_security_timeout(&mut self) {
        let Some(pending) = self.pending_secure.take() else {
            return;
        };
        if Instant::now() < pending.deadline {
            self.pending_secure = Some(pending);
            return;
        }
        let target = pending.message.target;
        self.node_log(target)
            .warn(|| "security handshake timed out, dropping message");
        self.notifications.push(Notification::Notification {
            node_id: target,
            code: NotificationCode::SecurityError,
        });
    }

    // ------------------------------------------------------------------
    // Inbound path
    // ------------------------------------------------------------------

    fn handle_serial_event(&mut self, event: SerialEvent) {
        match event {
            SerialEvent::Frame(frame) => self.handle_frame(frame),
            SerialEvent::Disconnected => self.fail_driver("serial device disappeared"),
        }
    }

    fn handle_frame(&mut self, frame: RawSerialFrame) {
        match frame {
            RawSerialFrame::ControlFlow(byte) => {
                self.serial_log().control_flow(byte, Direction::Inbound);
                self.handle_control_flow(byte);
            }
            RawSerialFrame::Data(bytes) => {
                self.serial_log().data(&bytes, Direction::Inbound);
                match CommandRaw::parse(&bytes).into_encoding_result() {
                    Ok(raw) => {
                        // Checksum verified: confirm reception
                        self.send_frame(RawSerialFrame::ControlFlow(ControlFlow::ACK));
                        self.handle_command_raw(raw);
                    }
                    Err(e) => {
                        // Frame error: ask for a resend
                        self.serial_log().discarded(&bytes);
                        self.driver_log()
                            .warn(move || format!("dropping invalid frame: {}", e));
                        self.send_frame(RawSerialFrame::ControlFlow(ControlFlow::NAK));
                    }
                }
            }
            RawSerialFrame::Garbage(bytes) => {
                self.serial_log().discarded(&bytes);
                self.send_frame(RawSerialFrame::ControlFlow(ControlFlow::NAK));
            }
        }
    }

    fn handle_control_flow(&mut self, byte: ControlFlow) {
        let Some(transaction) = self.transaction.as_mut() else {
            return;
        };
        let outcome =
            transaction.on_control(byte, Instant::now(), &self.options.timeouts);
        self.process_outcome(outcome);
    }

    fn handle_command_raw(&mut self, raw: CommandRaw) {
        let command = match Command::try_from_raw(&raw) {
            Ok(command) => command,
            Err(e) => {
                // A well-formed frame we cannot interpret: log and move on
                self.driver_log()
                    .warn(move || format!("failed to decode frame: {}", e));
                return;
            }
        };
        self.controller_log().command(&command, Direction::Inbound);

        // First offer the command to the in-flight transaction
        if let Some(transaction) = self.transaction.as_mut() {
            let outcome =
                transaction.on_command(&command, Instant::now(), &self.options.timeouts);
            if outcome != StepOutcome::Ignored {
                self.process_outcome(outcome);
                return;
            }
        }

        self.dispatch_unsolicited(command);
    }

    fn handle_transaction_timeout(&mut self) {
        let Some(transaction) = self.transaction.as_ref() else {
            return;
        };
        if Instant::now() < transaction.deadline {
            return;
        }
        let outcome = transaction.on_timeout();
        self.process_outcome(outcome);
    }

    // ------------------------------------------------------------------
    // Transaction outcomes
    // ------------------------------------------------------------------

    fn process_outcome(&mut self, outcome: StepOutcome) {
        match outcome {
            StepOutcome::Ignored | StepOutcome::Advanced => {}
            StepOutcome::Completed(response) => {
                let Some(mut transaction) = self.transaction.take() else {
                    return;
                };
                let response = response.or_else(|| transaction.take_response());
                self.complete_message(transaction.message, response);
            }
            StepOutcome::Failed(failure) => {
                let Some(transaction) = self.transaction.take() else {
                    return;
                };
                self.handle_transaction_failure(transaction, failure);
            }
        }
    }

    fn complete_message(&mut self, message: Message, response: Option<Command>) {
        if self.options.notify_transactions {
            self.notifications.push(Notification::Notification {
                node_id: message.target,
                code: NotificationCode::MsgComplete,
            });
        }

        // A delivered message proves the node is reachable
        if let Some(node) = self.nodes.get_mut(&message.target) {
            node.failure_count = 0;
        }

        if let Some(response) = response {
            self.apply_response(&message, response);
        }

        self.note_stage_message_done(message.target, &message, true);
    }

    fn handle_transaction_failure(
        &mut self,
        transaction: Transaction,
        failure: TransactionFailure,
    ) {
        let mut message = transaction.message;
        let can_retry = failure.is_retryable()
            && message.max_attempts > 0
            && (message.max_attempts == u8::MAX || message.attempts < message.max_attempts);

        if can_retry {
            let target = message.target;
            let attempts = message.attempts;
            self.node_log(target).warn(move || {
                format!("send attempt {} failed ({:?}), retrying", attempts, failure)
            });
            // Resend the identical frame, same callback id
            self.transmit(message);
            return;
        }

        let target = message.target;
        self.node_log(target)
            .warn(move || format!("giving up on message: {:?}", failure));

        if message.controller_command {
            self.finish_controller_command(ControllerState::Failed, None, None);
            return;
        }

        let is_listening = self
            .nodes
            .get(&target)
            .map(Node::is_listening)
            .unwrap_or(true);

        if target.is_valid() && !is_listening {
            // The node slept through our attempts. Park everything for it
            // until the next wake-up notification.
            self.declare_node_asleep(target, message);
        } else {
            self.drop_failed_message(target, message);
        }
    }

    /// The failure policy for listening nodes: drop, notify, count, probe
    fn drop_failed_message(&mut self, target: NodeId, message: Message) {
        self.notifications.push(Notification::Notification {
            node_id: target,
            code: NotificationCode::Timeout,
        });

        self.note_stage_message_done(target, &message, false);

        if let Some(node) = self.nodes.get_mut(&target) {
            node.failure_count = node.failure_count.saturating_add(1);
            if node.failure_count == self.options.node_dead_threshold {
                self.queue.enqueue(Message::controller(
                    zw_serial::command::IsFailedNodeRequest { node_id: target }.into(),
                    SendPriority::Controller,
                ));
            }
        }
    }

    /// The failure policy for sleeping nodes: move every queued message
    /// into the wake-up queue, dropping any WakeUpNoMoreInformation.
    fn declare_node_asleep(&mut self, target: NodeId, failed: Message) {
        let mut parked = self.queue.extract_for_node(target);
        if !is_wakeup_no_more_information(&failed) {
            parked.insert(0, failed);
        }
        parked.retain(|message| !is_wakeup_no_more_information(message));

        if let Some(node) = self.nodes.get_mut(&target) {
            node.awake = false;
            node.wakeup_queue.extend(parked);
        }
        self.notifications.push(Notification::Notification {
            node_id: target,
            code: NotificationCode::NodeAsleep,
        });
    }

    /// The node announced it is listening: replay its parked messages and
    /// let it go back to sleep afterwards
    fn wake_node(&mut self, node_id: NodeId) {
        let parked: Vec<Message> = match self.nodes.get_mut(&node_id) {
            Some(node) => {
                node.awake = true;
                node.failure_count = 0;
                node.wakeup_queue.drain(..).collect()
            }
            None => return,
        };
        self.notifications.push(Notification::Notification {
            node_id,
            code: NotificationCode::NodeAwake,
        });

        self.queue.inject_wakeup(parked);

        // Poll requests that came due while the node slept
        let poll_pending = self
            .nodes
            .get_mut(&node_id)
            .and_then(|node| node.classes.get_mut(&(CommandClasses::WakeUp as u8)))
            .and_then(|cc| cc.as_wake_up_mut())
            .map(|wake_up| std::mem::take(&mut wake_up.poll_pending))
            .unwrap_or(false);
        if poll_pending {
            self.request_poll_values_for_node(node_id);
        }

        // Resume the query pipeline where it paused
        self.advance_node_queries(node_id);

        // Let the node sleep again once its queue is drained. This goes
        // into the lowest band so every replayed, query and poll message
        // for the node leaves first; the node must not be sent to sleep
        // with work still queued. Never give up on this one: without it
        // the node stays awake and drains its battery.
        let no_more = Message::new(
            SendDataRequest::new(
                node_id,
                WakeUpCc::no_more_information().cc_bytes,
            )
            .into(),
            node_id,
            SendPriority::Poll,
        )
        .retry_forever();
        self.queue.enqueue(no_more);
    }

    // ------------------------------------------------------------------
    // Responses to controller queries
    // ------------------------------------------------------------------

    fn apply_response(&mut self, message: &Message, response: Command) {
        use zw_serial::command::*;

        match response {
            Command::GetControllerVersionResponse(response) => {
                self.controller.library_version = response.library_version;
                self.controller.library_type = response.library_type;
            }
            Command::MemoryGetIdResponse(response) => {
                self.controller.home_id = response.home_id;
                self.controller.own_node_id = response.own_node_id;
                self.load_persisted_state();
            }
            Command::GetControllerCapabilitiesResponse(response) => {
                self.controller.capabilities = Some(response.capabilities);
            }
            Command::GetSerialApiCapabilitiesResponse(response) => {
                self.controller.serial_api_version = response.serial_api_version;
            }
            Command::GetSerialApiInitDataResponse(response) => {
                for node_id in response.node_ids {
                    self.ensure_node(node_id);
                }
            }
            Command::GetSucNodeIdResponse(response) => {
                self.controller.suc_node_id = response.suc_node_id;
                if self.phase == DriverPhase::Identifying {
                    self.become_ready();
                }
            }
            Command::GetNodeProtocolInfoResponse(response) => {
                let target = message.target;
                if let Some(node) = self.nodes.get_mut(&target) {
                    node.protocol_info = Some(response.protocol_info);
                    // Battery devices get their wake-up class before the
                    // NIF names it, so the WakeUp stage can run
                    if !response.protocol_info.listening {
                        node.add_command_class(CommandClasses::WakeUp as u8, false);
                    }
                    self.notifications
                        .push(Notification::NodeProtocolInfo(target));
                }
            }
            Command::GetRoutingInfoResponse(response) => {
                // The neighbor list is exposed as a raw value on the node
                if let Some(node) = self.nodes.get_mut(&message.target) {
                    let id = ValueId::new(
                        self.controller.home_id,
                        message.target,
                        zw_core::value_id::ValueGenre::System,
                        CommandClasses::NoOperation as u8,
                        1,
                        1,
                        zw_core::values::ValueType::Raw,
                    );
                    let neighbors: Vec<u8> =
                        response.neighbors.iter().map(|&n| n.into()).collect();
                    let mut events = Vec::new();
                    let mut ctx = CcContext::new(
                        self.controller.home_id,
                        message.target,
                        self.controller.own_node_id,
                        &mut node.store,
                        &mut events,
                    );
                    ctx.commit_report(
                        id,
                        zw_core::value_store::ValueMetadata {
                            label: "Neighbors".into(),
                            read_only: true,
                            ..Default::default()
                        },
                        Value::Raw(neighbors),
                    );
                    self.push_value_events(events);
                }
            }
            Command::IsFailedNodeResponse(response) => {
                // Either the answer to a HasNodeFailed controller command
                // or to the automatic dead-node probe
                if let Some(active) = self.active_controller_command.as_mut() {
                    let progress = active.handle_command(&Command::IsFailedNodeResponse(
                        response.clone(),
                    ));
                    if self.apply_command_progress(progress) {
                        return;
                    }
                }
                if let Command::IsFailedNodeRequest(request) = &message.command {
                    let node_id = request.node_id;
                    if response.failed {
                        self.mark_node_dead(node_id);
                    } else if let Some(node) = self.nodes.get_mut(&node_id) {
                        node.failure_count = 0;
                    }
                }
            }
            _ => {}
        }
    }

    fn become_ready(&mut self) {
        self.phase = DriverPhase::Ready;
        self.ready_flag.store(true, Ordering::SeqCst);
        let home_id = self.controller.home_id;
        let own_node_id = self.controller.own_node_id;
        self.driver_log().info(move || {
            format!(
                "controller ready: home id {}, own node id {}",
                home_id, own_node_id
            )
        });
        self.notifications.push(Notification::DriverReady {
            home_id,
            own_node_id,
        });

        // Kick off the interview pipeline for every known node
        let node_ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for node_id in node_ids {
            self.advance_node_queries(node_id);
        }
        self.check_query_milestones();
    }

    fn load_persisted_state(&mut self) {
        let Some(serializer) = self.serializer.as_ref() else {
            return;
        };
        match serializer.load() {
            Ok(Some(state)) if state.home_id == self.controller.home_id => {
                let count = state.nodes.len();
                self.driver_log()
                    .info(move || format!("restored {} nodes from persisted state", count));
                for node in state.nodes {
                    self.restored_nodes.insert(node.id, node);
                }
            }
            Ok(Some(state)) => {
                let stored = state.home_id;
                self.driver_log().warn(move || {
                    format!("persisted state is for {}, ignoring", stored)
                });
            }
            Ok(None) => {}
            Err(e) => {
                // Incompatible state: recover by re-querying the network
                self.driver_log()
                    .warn(move || format!("discarding persisted state: {}", e));
            }
        }
    }

    fn persist_state(&mut self) {
        let Some(serializer) = self.serializer.as_ref() else {
            return;
        };
        let state = PersistedState {
            schema_version: SCHEMA_VERSION,
            home_id: self.controller.home_id,
            own_node_id: self.controller.own_node_id,
            nodes: self.nodes.values().map(PersistedNode::from_node).collect(),
        };
        if let Err(e) = serializer.save(&state) {
            self.driver_log()
                .error(move || format!("failed to persist state: {}", e));
        }
    }

    // ------------------------------------------------------------------
    // Unsolicited commands
    // ------------------------------------------------------------------

    fn dispatch_unsolicited(&mut self, command: Command) {
        // An active controller command consumes its callbacks first
        if let Some(active) = self.active_controller_command.as_mut() {
            let progress = active.handle_command(&command);
            if self.apply_command_progress(progress) {
                return;
            }
        }

        match command {
            Command::ApplicationCommandRequest(request) => {
                let node_id = request.source_node_id;
                self.ensure_node(node_id);
                self.route_cc_frame(node_id, &request.cc_bytes, 1);
                self.advance_node_queries(node_id);
            }
            Command::ApplicationUpdateRequest(update) => {
                self.handle_application_update(update);
            }
            other => {
                self.driver_log()
                    .debug(move || format!("unhandled unsolicited command: {:?}", other));
            }
        }
    }

    fn apply_command_progress(&mut self, progress: CommandProgress) -> bool {
        match progress {
            CommandProgress::Ignored => false,
            CommandProgress::Update(state) => {
                self.notifications.push(Notification::ControllerCommand {
                    state,
                    error: None,
                });
                true
            }
            CommandProgress::Finished {
                state,
                added_node,
                removed_node,
            } => {
                self.finish_controller_command(state, added_node, removed_node);
                true
            }
        }
    }

    fn finish_controller_command(
        &mut self,
        state: ControllerState,
        added_node: Option<NodeId>,
        removed_node: Option<NodeId>,
    ) {
        self.active_controller_command = None;
        self.notifications.push(Notification::ControllerCommand {
            state,
            error: None,
        });

        if let Some(node_id) = added_node {
            self.ensure_node(node_id);
            self.advance_node_queries(node_id);
        }
        if let Some(node_id) = removed_node
            && self.nodes.remove(&node_id).is_some()
        {
            self.notifications.push(Notification::NodeRemoved(node_id));
        }
    }

    fn handle_application_update(
        &mut self,
        update: zw_serial::command::ApplicationUpdateRequest,
    ) {
        match update.state {
            UpdateState::NodeInfoReceived => {
                let node_id = update.node_id;
                self.ensure_node(node_id);
                let Some(node_info) = update.node_info else {
                    return;
                };

                let Some(node) = self.nodes.get_mut(&node_id) else {
                    return;
                };
                node.awaiting_nif = false;

                let mut created = Vec::new();
                for cc_id in &node_info.supported_command_classes {
                    if node.add_command_class(*cc_id, false) {
                        created.push(*cc_id);
                    }
                }
                for cc_id in &node_info.controlled_command_classes {
                    node.add_command_class(*cc_id, true);
                }

                self.configure_security(node_id);

                // Let each fresh class declare its values
                self.create_class_vars(node_id, &created, 1);

                // The buffered frames that arrived before their classes
                let buffered: Vec<Vec<u8>> = self
                    .nodes
                    .get_mut(&node_id)
                    .map(|node| node.buffered_frames.drain(..).collect())
                    .unwrap_or_default();
                for frame in buffered {
                    self.route_cc_frame(node_id, &frame, 1);
                }

                self.advance_node_queries(node_id);
            }
            UpdateState::NodeInfoReqFailed => {
                // The dongle reports this with node id 0; correlate via
                // the node that still waits for its NIF
                let Some(node_id) = self
                    .nodes
                    .values()
                    .find(|node| node.awaiting_nif)
                    .map(|node| node.id)
                else {
                    return;
                };
                self.node_log(node_id).warn(|| "node info request failed");
                let mut retry = Message::new(
                    zw_serial::command::RequestNodeInfoRequest { node_id }.into(),
                    node_id,
                    SendPriority::Query,
                );
                retry.stage_tracked = true;
                self.note_stage_message_done(node_id, &retry, false);
                // If the stage retries, the re-queued request arms the
                // NIF wait again
                if let Some(node) = self.nodes.get_mut(&node_id) {
                    node.awaiting_nif =
                        node.query_stage == QueryStage::NodeInfo && node.stage_outstanding > 0;
                }
            }
            _ => {}
        }
    }

    fn create_class_vars(&mut self, node_id: NodeId, cc_ids: &[u8], instance: u8) {
        let home_id = self.controller.home_id;
        let own_node_id = self.controller.own_node_id;
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };

        let mut events = Vec::new();
        // Classes borrow the store mutably one at a time
        for cc_id in cc_ids {
            if let Some(cc) = node.classes.remove(cc_id) {
                {
                    let mut ctx = CcContext::new(
                        home_id,
                        node_id,
                        own_node_id,
                        &mut node.store,
                        &mut events,
                    );
                    cc.create_vars(&mut ctx, instance);
                }
                node.classes.insert(*cc_id, cc);
            }
        }
        self.push_value_events(events);
    }

    /// Routes one CC frame (possibly unwrapped from encapsulation) to its
    /// class on the node
    fn route_cc_frame(&mut self, node_id: NodeId, cc_bytes: &[u8], instance: u8) {
        let Some(&cc_id) = cc_bytes.first() else {
            return;
        };
        // NoOperation has no command byte
        let cmd = cc_bytes.get(1).copied().unwrap_or(0);
        let payload = if cc_bytes.len() > 2 {
            &cc_bytes[2..]
        } else {
            &[]
        };

        let home_id = self.controller.home_id;
        let own_node_id = self.controller.own_node_id;

        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };

        // Track reports the interview stage waits for
        node.note_stage_report(cc_id, cmd);

        let Some(mut cc) = node.classes.remove(&cc_id) else {
            if node.query_stage <= QueryStage::NodeInfo {
                // Still discovering: maybe the class appears with the NIF
                node.buffer_frame(cc_bytes.to_vec());
            } else {
                self.node_log(node_id).debug(move || {
                    format!("dropping frame for unknown class 0x{:02x}", cc_id)
                });
            }
            return;
        };

        if cc.info().after_mark {
            // Controlled, not supported: surface the activity, touch no
            // values
            node.classes.insert(cc_id, cc);
            self.notifications.push(Notification::Notification {
                node_id,
                code: NotificationCode::ControlledClassActivity,
            });
            return;
        }

        let mut events = Vec::new();
        let result = {
            let mut ctx = CcContext::new(
                home_id,
                node_id,
                own_node_id,
                &mut node.store,
                &mut events,
            );
            cc.handle_msg(&mut ctx, cmd, payload, instance)
        };
        node.classes.insert(cc_id, cc);
        self.push_value_events(events);

        match result {
            Ok(disposition) => self.handle_disposition(node_id, disposition, instance),
            Err(zw_cc::commandclass::CcError::SecurityFailure(reason)) => {
                self.node_log(node_id)
                    .warn(move || format!("security failure: {}", reason));
                self.notifications.push(Notification::Notification {
                    node_id,
                    code: NotificationCode::SecurityError,
                });
            }
            Err(e) => {
                self.node_log(node_id)
                    .warn(move || format!("dropping malformed frame: {}", e));
            }
        }
    }

    fn handle_disposition(&mut self, node_id: NodeId, disposition: Disposition, instance: u8) {
        match disposition {
            Disposition::Consumed | Disposition::NotHandled => {}

            Disposition::ClassVersion { cc_id, version } => {
                if let Some(node) = self.nodes.get_mut(&node_id)
                    && let Some(cc) = node.classes.get_mut(&cc_id)
                {
                    cc.info_mut().version = version;
                }
            }

            Disposition::InstanceCount { cc_id, count } => {
                if let Some(node) = self.nodes.get_mut(&node_id)
                    && let Some(cc) = node.classes.get_mut(&cc_id)
                {
                    cc.info_mut().instance_count = count;
                }
                // Values for the additional instances
                for extra_instance in 2..=count {
                    self.create_class_vars(node_id, &[cc_id], extra_instance);
                }
            }

            Disposition::EndpointCount { count } => {
                if let Some(node) = self.nodes.get_mut(&node_id)
                    && let Some(cc) =
                        node.classes.get_mut(&(CommandClasses::MultiInstance as u8))
                {
                    cc.info_mut().instance_count = count.max(1);
                }
            }

            Disposition::WakeUpNotification => self.wake_node(node_id),

            Disposition::NodeEvent { event } => {
                self.notifications
                    .push(Notification::NodeEvent { node_id, event });
            }

            Disposition::ManufacturerInfo {
                manufacturer_id,
                product_type,
                product_id,
            } => {
                if let Some(node) = self.nodes.get_mut(&node_id) {
                    node.manufacturer_id = Some(manufacturer_id);
                    node.product_type = Some(product_type);
                    node.product_id = Some(product_id);
                }
                self.notifications.push(Notification::NodeNaming(node_id));
            }

            Disposition::GroupCount { count } => {
                self.apply_group_count(node_id, count);
            }

            Disposition::GroupMembers {
                group_idx,
                max_associations,
                node_ids,
            } => {
                if let Some(node) = self.nodes.get_mut(&node_id) {
                    let group = node.groups.entry(group_idx).or_insert_with(|| Group {
                        label: format!("Group {}", group_idx),
                        ..Default::default()
                    });
                    group.max_associations = max_associations;
                    group.members =
                        node_ids.into_iter().map(|member| (member, None)).collect();
                }
                self.notifications.push(Notification::Group {
                    node_id,
                    group_idx,
                });
            }

            Disposition::Encapsulated { instance, inner } => {
                self.route_cc_frame(node_id, &inner, instance.max(1));
            }

            Disposition::Batch { frames } => {
                for frame in frames {
                    self.route_cc_frame(node_id, &frame, instance);
                }
            }

            Disposition::NonceGet => {
                let report = self
                    .nodes
                    .get_mut(&node_id)
                    .and_then(|node| {
                        node.classes.get_mut(&(CommandClasses::Security as u8))
                    })
                    .and_then(|cc| cc.as_security_mut())
                    .map(|security| security.make_nonce_report());
                if let Some(report) = report {
                    // Nonces expire fast; jump the queue
                    self.queue.enqueue(Message::new(
                        SendDataRequest::new(node_id, report.cc_bytes).into(),
                        node_id,
                        SendPriority::Controller,
                    ));
                }
            }

            Disposition::NonceReport { nonce } => {
                self.continue_secure_send(node_id, nonce);
            }

            Disposition::SecureFrame { inner } => {
                self.route_cc_frame(node_id, &inner, instance);
            }
        }
    }

    fn apply_group_count(&mut self, node_id: NodeId, count: u8) {
        let mut queries = Vec::new();
        let mut in_stage = false;
        if let Some(node) = self.nodes.get_mut(&node_id) {
            for group_idx in 1..=count {
                node.groups.entry(group_idx).or_insert_with(|| Group {
                    label: format!("Group {}", group_idx),
                    ..Default::default()
                });
                queries.push(group_idx);
            }
            in_stage = node.query_stage == QueryStage::Associations;
        }
        for group_idx in queries {
            let get = zw_cc::commandclass::AssociationCc::new().group_get(group_idx);
            if in_stage {
                // Extend the running stage with the member queries
                self.enqueue_outgoing(node_id, get, SendPriority::Query);
            } else if let Some(message) =
                self.build_cc_message(node_id, get, SendPriority::Command)
            {
                self.queue.enqueue(message);
            }
        }
    }

    /// Finishes the nonce handshake: encrypt the held message with the
    /// fresh nonce and put it at the front of the queue
    fn continue_secure_send(&mut self, node_id: NodeId, nonce: [u8; 8]) {
        let Some(pending) = self.pending_secure.take() else {
            return;
        };
        if pending.message.target != node_id {
            self.pending_secure = Some(pending);
            return;
        }
        let mut message = pending.message;
        let Some(plain_cc) = message.secure_cc.take() else {
            return;
        };

        let own_node_id = self.controller.own_node_id;
        let encrypted = self
            .nodes
            .get_mut(&node_id)
            .and_then(|node| node.classes.get_mut(&(CommandClasses::Security as u8)))
            .and_then(|cc| cc.as_security_mut())
            .map(|security| {
                security.encrypt_message(&plain_cc, own_node_id, node_id, &nonce)
            });

        match encrypted {
            Some(Ok(cc_bytes)) => {
                message.command = SendDataRequest::new(node_id, cc_bytes).into();
                self.queue.requeue_front(message);
            }
            Some(Err(e)) => {
                self.node_log(node_id)
                    .warn(move || format!("failed to encrypt message: {}", e));
                self.notifications.push(Notification::Notification {
                    node_id,
                    code: NotificationCode::SecurityError,
                });
            }
            None => {}
        }
    }

    // ------------------------------------------------------------------
    // Node lifecycle & query pipeline
    // ------------------------------------------------------------------

    fn ensure_node(&mut self, node_id: NodeId) {
        if !node_id.is_valid() || self.nodes.contains_key(&node_id) {
            return;
        }

        self.notifications.push(Notification::NodeNew(node_id));

        let node = match self.restored_nodes.remove(&node_id) {
            Some(persisted) => {
                let mut node = persisted.restore();
                // Cached nodes skip straight to the post-cache stages
                node.enter_stage(QueryStage::CacheLoad);
                node
            }
            None => {
                let mut node = Node::new(node_id);
                if node_id == self.controller.own_node_id {
                    // The controller does not interview itself
                    node.enter_stage(QueryStage::Complete);
                }
                node
            }
        };
        self.nodes.insert(node_id, node);
        self.configure_security(node_id);
        self.notifications.push(Notification::NodeAdded(node_id));
    }

    /// Hands the configured S0 network key to the node's Security class
    fn configure_security(&mut self, node_id: NodeId) {
        let Some(key) = &self.options.network_key else {
            return;
        };
        if let Some(node) = self.nodes.get_mut(&node_id)
            && let Some(cc) = node.classes.get_mut(&(CommandClasses::Security as u8))
            && let Some(security) = cc.as_security_mut()
            && !security.has_key()
        {
            security.set_network_key(key);
        }
    }

    fn mark_node_dead(&mut self, node_id: NodeId) {
        let home_id = self.controller.home_id;
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.dead = true;
            // Expose the failure as a queryable state value
            let id = ValueId::new(
                home_id,
                node_id,
                zw_core::value_id::ValueGenre::System,
                CommandClasses::NoOperation as u8,
                1,
                0,
                zw_core::values::ValueType::Bool,
            );
            node.store.apply_cached(
                id,
                zw_core::value_store::ValueMetadata {
                    label: "Node Failed".into(),
                    read_only: true,
                    ..Default::default()
                },
                Some(Value::Bool(true)),
            );
        }
        self.node_log(node_id).warn(|| "node is failed/dead");
        self.notifications.push(Notification::Notification {
            node_id,
            code: NotificationCode::NodeDead,
        });
        self.check_query_milestones();
    }

    /// Bookkeeping when a stage message leaves the engine, successfully
    /// or not. Membership is carried on the message itself: a parked
    /// stage frame replayed from the wake-up queue arrives here with a
    /// different priority but must still settle its stage.
    fn note_stage_message_done(&mut self, target: NodeId, message: &Message, success: bool) {
        if !message.stage_tracked {
            return;
        }

        enum StageAction {
            Advance,
            Skip(QueryStage),
            Retry,
        }

        let retry_budget = self.options.retry_budget;
        let action = {
            let Some(node) = self.nodes.get_mut(&target) else {
                return;
            };
            node.stage_outstanding = node.stage_outstanding.saturating_sub(1);
            if success {
                StageAction::Advance
            } else {
                // Remove the report nobody will send now
                if let Some((cc_id, cc_command)) = message.expected_cc_report {
                    node.note_stage_report(cc_id, cc_command);
                }
                node.awaiting_nif = false;
                node.stage_attempts = node.stage_attempts.saturating_add(1);
                if node.stage_attempts >= retry_budget {
                    StageAction::Skip(node.query_stage)
                } else {
                    if let Some(expected) = message.expected_cc_report {
                        node.stage_reports.push(expected);
                    }
                    node.stage_outstanding += 1;
                    StageAction::Retry
                }
            }
        };

        match action {
            StageAction::Advance => self.advance_node_queries(target),
            StageAction::Skip(stage) => {
                // Skipped with cause, so one misbehaving class cannot
                // wedge the whole interview
                self.node_log(target).warn(move || {
                    format!("skipping query stage {:?} after repeated failures", stage)
                });
                self.notifications.push(Notification::Notification {
                    node_id: target,
                    code: NotificationCode::MsgDropped,
                });
                if let Some(node) = self.nodes.get_mut(&target) {
                    // Reset the stage bookkeeping; the advance loop moves
                    // on from a settled stage
                    node.enter_stage(stage);
                }
                self.advance_node_queries(target);
            }
            StageAction::Retry => {
                let mut retry = message.clone();
                retry.attempts = 0;
                if !self.queue.enqueue(retry) {
                    // Duplicate already queued: undo the bookkeeping
                    if let Some(node) = self.nodes.get_mut(&target) {
                        node.stage_outstanding = node.stage_outstanding.saturating_sub(1);
                        if let Some((cc_id, cc_command)) = message.expected_cc_report {
                            node.note_stage_report(cc_id, cc_command);
                        }
                    }
                }
            }
        }
    }

    /// Drives the query pipeline: skips empty stages, starts the next
    /// stage's messages, pauses while the node sleeps.
    fn advance_node_queries(&mut self, node_id: NodeId) {
        if self.phase != DriverPhase::Ready {
            return;
        }
        loop {
            let Some(node) = self.nodes.get(&node_id) else {
                return;
            };
            if node.dead || !node.is_awake() || !node.stage_settled() {
                return;
            }
            if node.query_stage.is_complete() {
                self.finish_node_queries(node_id);
                return;
            }

            let next = node.query_stage.next();
            if let Some(node) = self.nodes.get_mut(&node_id) {
                node.enter_stage(next);
            }
            if next == QueryStage::CacheLoad {
                // Everything before the cached stages is essential
                self.notifications
                    .push(Notification::EssentialNodeQueriesComplete(node_id));
            }

            let queued = self.start_stage(node_id);
            if queued > 0 {
                return;
            }
            // Nothing to do in this stage: advance immediately
        }
    }

    fn finish_node_queries(&mut self, node_id: NodeId) {
        let already_done = self
            .nodes
            .get_mut(&node_id)
            .map(|node| std::mem::replace(&mut node.queries_complete, true))
            .unwrap_or(true);
        if already_done {
            return;
        }
        self.notifications
            .push(Notification::NodeQueriesComplete(node_id));
        self.check_query_milestones();
    }

    fn check_query_milestones(&mut self) {
        let all_listening_done = self
            .nodes
            .values()
            .filter(|node| node.is_listening())
            .all(|node| node.query_stage.is_complete() || node.dead);
        let some_dead = self.nodes.values().any(|node| node.dead);
        let all_done = self
            .nodes
            .values()
            .all(|node| node.query_stage.is_complete() || node.dead);

        if all_listening_done && !self.awake_queried_notified {
            self.awake_queried_notified = true;
            self.notifications.push(Notification::AwakeNodesQueried);
        }
        if all_done && !self.all_queried_notified && !self.nodes.is_empty() {
            self.all_queried_notified = true;
            self.notifications.push(if some_dead {
                Notification::AllNodesQueriedSomeDead
            } else {
                Notification::AllNodesQueried
            });
        }
    }

    /// Enqueues the messages of the node's current stage. Returns how
    /// many were queued; zero means the stage does not apply.
    fn start_stage(&mut self, node_id: NodeId) -> usize {
        use zw_serial::command::{GetNodeProtocolInfoRequest, GetRoutingInfoRequest,
            RequestNodeInfoRequest};

        let Some(node) = self.nodes.get(&node_id) else {
            return 0;
        };
        let stage = node.query_stage;

        match stage {
            QueryStage::None | QueryStage::Complete => 0,

            QueryStage::ProtocolInfo => {
                let message = Message::new(
                    GetNodeProtocolInfoRequest { node_id }.into(),
                    node_id,
                    SendPriority::Query,
                );
                self.queue_stage_message(node_id, message)
            }

            QueryStage::Probe => {
                let ping = NoOperationCc::ping();
                let message = Message::new(
                    SendDataRequest::new(node_id, ping.cc_bytes).into(),
                    node_id,
                    SendPriority::NoOp,
                );
                self.queue_stage_message(node_id, message)
            }

            QueryStage::WakeUp => {
                if node.is_listening() || !node.supports_cc(CommandClasses::WakeUp as u8) {
                    return 0;
                }
                let own_node_id = self.controller.own_node_id;
                let wake_up = WakeUpCc::new();
                let set =
                    wake_up.interval_set(DEFAULT_WAKE_UP_INTERVAL_SECS, own_node_id);
                let get = wake_up
                    .request_state(StateKind::Static, 1)
                    .into_iter()
                    .next();
                let mut queued = self.enqueue_outgoing(node_id, set, SendPriority::Query);
                if let Some(get) = get {
                    queued += self.enqueue_outgoing(node_id, get, SendPriority::Query);
                }
                queued
            }

            QueryStage::ManufacturerSpecific1 => {
                if !node.is_listening() {
                    return 0;
                }
                self.request_manufacturer_info(node_id)
            }

            QueryStage::NodeInfo => {
                let message = Message::new(
                    RequestNodeInfoRequest { node_id }.into(),
                    node_id,
                    SendPriority::Query,
                );
                let queued = self.queue_stage_message(node_id, message);
                if let Some(node) = self.nodes.get_mut(&node_id) {
                    node.awaiting_nif = queued > 0;
                }
                queued
            }

            // No Z-Wave+ support in the class registry
            QueryStage::NodePlusInfo => 0,

            QueryStage::ManufacturerSpecific2 => {
                if node.manufacturer_id.is_some() {
                    return 0;
                }
                self.request_manufacturer_info(node_id)
            }

            QueryStage::Versions => {
                if !node.supports_cc(CommandClasses::Version as u8) {
                    return 0;
                }
                let version_cc = VersionCc::new();
                let queries: Vec<OutgoingCc> = node
                    .classes
                    .values()
                    .filter(|cc| !cc.info().after_mark)
                    .filter(|cc| cc.cc_id() != CommandClasses::NoOperation as u8)
                    .map(|cc| version_cc.class_version_get(cc.cc_id()))
                    .collect();
                let mut queued = 0;
                for query in queries {
                    queued += self.enqueue_outgoing(node_id, query, SendPriority::Query);
                }
                queued
            }

            QueryStage::Instances => {
                let multi_id = CommandClasses::MultiInstance as u8;
                if !node.supports_cc(multi_id) {
                    return 0;
                }
                let multi_version = node
                    .classes
                    .get(&multi_id)
                    .map(|cc| cc.info().version)
                    .unwrap_or(1);
                let multi = MultiInstanceCc::new();
                let mut queries = Vec::new();
                if multi_version >= 2 {
                    queries.push(multi.endpoint_get());
                } else {
                    queries.extend(
                        node.classes
                            .values()
                            .filter(|cc| !cc.info().after_mark)
                            .filter(|cc| cc.cc_id() != multi_id)
                            .filter(|cc| {
                                cc.cc_id() != CommandClasses::NoOperation as u8
                            })
                            .map(|cc| multi.instance_count_get(cc.cc_id())),
                    );
                }
                let mut queued = 0;
                for query in queries {
                    queued += self.enqueue_outgoing(node_id, query, SendPriority::Query);
                }
                queued
            }

            QueryStage::Static => self.request_state_all(node_id, StateKind::Static),

            // Persisted values were applied when the node was restored
            QueryStage::CacheLoad => 0,

            QueryStage::Associations => {
                if !node.supports_cc(CommandClasses::Association as u8) {
                    return 0;
                }
                let get = zw_cc::commandclass::AssociationCc::new().groupings_get();
                self.enqueue_outgoing(node_id, get, SendPriority::Query)
            }

            QueryStage::Neighbors => {
                let message = Message::new(
                    GetRoutingInfoRequest::new(node_id).into(),
                    node_id,
                    SendPriority::Query,
                );
                self.queue_stage_message(node_id, message)
            }

            QueryStage::Session => self.request_state_all(node_id, StateKind::Session),

            QueryStage::Dynamic => self.request_state_all(node_id, StateKind::Dynamic),

            QueryStage::Configuration => {
                let config_id = CommandClasses::Configuration as u8;
                if !node.supports_cc(config_id) {
                    return 0;
                }
                // Refresh the parameters we know about from cache or
                // earlier reports
                let params: Vec<u8> = node
                    .store
                    .ids()
                    .filter(|id| id.command_class_id() == config_id)
                    .map(|id| id.index())
                    .collect();
                let config = zw_cc::commandclass::ConfigurationCc::new();
                let mut queued = 0;
                for param in params {
                    queued +=
                        self.enqueue_outgoing(node_id, config.param_get(param), SendPriority::Query);
                }
                queued
            }
        }
    }

    fn request_manufacturer_info(&mut self, node_id: NodeId) -> usize {
        let Some(node) = self.nodes.get(&node_id) else {
            return 0;
        };
        if !node.supports_cc(CommandClasses::ManufacturerSpecific as u8) {
            return 0;
        }
        let queries = zw_cc::commandclass::ManufacturerSpecificCc::new()
            .request_state(StateKind::Static, 1);
        let mut queued = 0;
        for query in queries {
            queued += self.enqueue_outgoing(node_id, query, SendPriority::Query);
        }
        queued
    }

    fn request_state_all(&mut self, node_id: NodeId, kind: StateKind) -> usize {
        let Some(node) = self.nodes.get(&node_id) else {
            return 0;
        };
        let mut queries = Vec::new();
        for cc in node.classes.values().filter(|cc| !cc.info().after_mark) {
            for instance in 1..=cc.info().instance_count.max(1) {
                queries.extend(cc.request_state(kind, instance));
            }
        }
        let mut queued = 0;
        for query in queries {
            queued += self.enqueue_outgoing(node_id, query, SendPriority::Query);
        }
        queued
    }

    /// Wraps an [OutgoingCc] into a SendData message with encapsulation
    /// and security applied, then queues it as part of the current stage
    fn enqueue_outgoing(
        &mut self,
        node_id: NodeId,
        outgoing: OutgoingCc,
        priority: SendPriority,
    ) -> usize {
        let Some(message) = self.build_cc_message(node_id, outgoing, priority) else {
            return 0;
        };
        self.queue_stage_message(node_id, message)
    }

    fn queue_stage_message(&mut self, node_id: NodeId, mut message: Message) -> usize {
        message.stage_tracked = true;
        let expected = message.expected_cc_report;
        if !self.queue.enqueue(message) {
            return 0;
        }
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.stage_outstanding += 1;
            if let Some(expected) = expected {
                node.stage_reports.push(expected);
            }
        }
        1
    }

    /// Builds the SendData message for a CC command, applying
    /// multi-instance/multi-channel encapsulation and the secure flag
    fn build_cc_message(
        &mut self,
        node_id: NodeId,
        outgoing: OutgoingCc,
        priority: SendPriority,
    ) -> Option<Message> {
        let node = self.nodes.get(&node_id)?;

        let mut cc_bytes = outgoing.cc_bytes;
        if outgoing.instance > 1 {
            let multi_version = node
                .classes
                .get(&(CommandClasses::MultiInstance as u8))
                .map(|cc| cc.info().version)
                .unwrap_or(1);
            cc_bytes = if multi_version >= 2 {
                MultiInstanceCc::encapsulate_v2(outgoing.instance, &cc_bytes)
            } else {
                MultiInstanceCc::encapsulate_v1(outgoing.instance, &cc_bytes)
            };
        }

        let class_secure = cc_bytes
            .first()
            .and_then(|cc_id| node.classes.get(cc_id))
            .map(|cc| cc.info().secure)
            .unwrap_or(false);
        let secure = outgoing.secure || class_secure;

        let mut message = Message::new(
            SendDataRequest::new(node_id, cc_bytes.clone()).into(),
            node_id,
            priority,
        )
        .with_max_attempts(self.options.retry_budget);
        if let Some((cc_id, cc_command)) = outgoing.expects_report {
            message = message.expecting_cc_report(cc_id, cc_command);
        }
        if secure {
            message.secure_cc = Some(cc_bytes);
        }
        Some(message)
    }

    // ------------------------------------------------------------------
    // Polling
    // ------------------------------------------------------------------

    fn handle_poll_tick(&mut self) {
        self.next_poll_at = Instant::now() + self.poll.interval();
        if self.phase != DriverPhase::Ready {
            return;
        }
        let due = self.poll.tick();
        for value_id in due {
            self.request_polled_value(value_id);
        }
    }

    fn request_polled_value(&mut self, value_id: ValueId) {
        let node_id = value_id.node_id();
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };

        if !node.is_awake() {
            // Remember to poll when the node next wakes
            if let Some(wake_up) = node
                .classes
                .get_mut(&(CommandClasses::WakeUp as u8))
                .and_then(|cc| cc.as_wake_up_mut())
            {
                wake_up.poll_pending = true;
            }
            return;
        }

        let request = node
            .classes
            .get(&value_id.command_class_id())
            .and_then(|cc| cc.request_value(value_id.index(), value_id.instance()));
        if let Some(request) = request
            && let Some(message) =
                self.build_cc_message(node_id, request, SendPriority::Poll)
        {
            self.queue.enqueue(message);
        }
    }

    fn request_poll_values_for_node(&mut self, node_id: NodeId) {
        let due: Vec<ValueId> = self
            .nodes
            .get(&node_id)
            .map(|node| {
                node.store
                    .ids()
                    .filter(|id| self.poll.is_polled(id))
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        for value_id in due {
            self.request_polled_value(value_id);
        }
    }

    // ------------------------------------------------------------------
    // Embedder requests
    // ------------------------------------------------------------------

    fn handle_input(&mut self, input: DriverInput) {
        match input {
            DriverInput::SetValue {
                value_id,
                value,
                reply,
            } => {
                let result = self.set_value(value_id, value);
                let _ = reply.send(result);
            }
            DriverInput::GetValue { value_id, reply } => {
                let stored = self
                    .nodes
                    .get(&value_id.node_id())
                    .and_then(|node| node.store.get(&value_id))
                    .cloned();
                let _ = reply.send(stored);
            }
            DriverInput::RequestValue { value_id } => {
                self.request_polled_value(value_id);
            }
            DriverInput::SetConfigParam {
                node_id,
                param,
                value,
                size,
            } => {
                let config = zw_cc::commandclass::ConfigurationCc::new();
                match config.param_set(param, value, size) {
                    Ok(outgoing) => {
                        if let Some(message) =
                            self.build_cc_message(node_id, outgoing, SendPriority::Command)
                        {
                            self.queue.enqueue(message);
                        }
                    }
                    Err(e) => {
                        self.node_log(node_id)
                            .warn(move || format!("rejecting config set: {}", e));
                    }
                }
            }
            DriverInput::RequestConfigParam { node_id, param } => {
                let get = zw_cc::commandclass::ConfigurationCc::new().param_get(param);
                if let Some(message) =
                    self.build_cc_message(node_id, get, SendPriority::Command)
                {
                    self.queue.enqueue(message);
                }
            }
            DriverInput::GetAssociations {
                node_id,
                group_idx,
                reply,
            } => {
                let members = self
                    .nodes
                    .get(&node_id)
                    .and_then(|node| node.groups.get(&group_idx))
                    .map(|group| group.members.clone())
                    .unwrap_or_default();
                let _ = reply.send(members);
            }
            DriverInput::AddAssociation {
                node_id,
                group_idx,
                target,
            } => {
                let cc = zw_cc::commandclass::AssociationCc::new();
                for outgoing in [cc.add(group_idx, target), cc.group_get(group_idx)] {
                    if let Some(message) =
                        self.build_cc_message(node_id, outgoing, SendPriority::Command)
                    {
                        self.queue.enqueue(message);
                    }
                }
            }
            DriverInput::RemoveAssociation {
                node_id,
                group_idx,
                target,
            } => {
                let cc = zw_cc::commandclass::AssociationCc::new();
                for outgoing in [cc.remove(group_idx, target), cc.group_get(group_idx)] {
                    if let Some(message) =
                        self.build_cc_message(node_id, outgoing, SendPriority::Command)
                    {
                        self.queue.enqueue(message);
                    }
                }
            }
            DriverInput::BeginControllerCommand { command } => {
                self.begin_controller_command(command);
            }
            DriverInput::CancelControllerCommand => {
                self.cancel_controller_command();
            }
            DriverInput::EnablePoll {
                value_id,
                intensity,
            } => {
                if self.poll.enable(value_id, intensity) {
                    self.notifications
                        .push(Notification::PollingEnabled(value_id));
                } else {
                    self.notifications
                        .push(Notification::PollingDisabled(value_id));
                }
            }
            DriverInput::DisablePoll { value_id } => {
                if self.poll.disable(&value_id) {
                    self.notifications
                        .push(Notification::PollingDisabled(value_id));
                }
            }
            DriverInput::SetPollInterval { interval } => {
                self.poll.set_interval(interval);
            }
            DriverInput::RefreshNodeInfo { node_id } => {
                if let Some(node) = self.nodes.get_mut(&node_id) {
                    node.enter_stage(QueryStage::None);
                    self.advance_node_queries(node_id);
                }
            }
            DriverInput::SoftReset => {
                self.queue.enqueue(Message::controller(
                    zw_serial::command::SoftResetRequest::default().into(),
                    SendPriority::Controller,
                ));
                self.notifications.push(Notification::DriverReset);
            }
            DriverInput::Shutdown => {
                self.exit = true;
            }
        }
    }

    fn set_value(&mut self, value_id: ValueId, value: Value) -> Result<()> {
        // Broadcast sets go out without per-node bookkeeping
        if value_id.node_id().is_broadcast() {
            let cc = zw_cc::registry::create_command_class(value_id.command_class_id())
                .ok_or(Error::UnknownValue)?;
            let outgoing = cc
                .set_value(&value_id, &value)
                .map_err(|e| Error::InvalidValue(e.to_string()))?;
            for out in outgoing {
                let message = Message::new(
                    SendDataRequest::new(NodeId::broadcast(), out.cc_bytes).into(),
                    NodeId::broadcast(),
                    SendPriority::Command,
                );
                self.queue.enqueue(message);
            }
            return Ok(());
        }

        let node = self
            .nodes
            .get_mut(&value_id.node_id())
            .ok_or(Error::UnknownNode(value_id.node_id()))?;
        let stored = node.store.get(&value_id).ok_or(Error::UnknownValue)?;

        // Reject out-of-range and read-only sets before any wire traffic
        if stored.metadata.read_only {
            return Err(Error::InvalidValue("value is read-only".into()));
        }
        if let Some(magnitude) = value.as_i64() {
            if let Some(min) = stored.metadata.min
                && magnitude < min
            {
                return Err(Error::InvalidValue(format!(
                    "{} below minimum {}",
                    magnitude, min
                )));
            }
            if let Some(max) = stored.metadata.max
                && magnitude > max
            {
                return Err(Error::InvalidValue(format!(
                    "{} above maximum {}",
                    magnitude, max
                )));
            }
        }

        let cc = node
            .classes
            .get(&value_id.command_class_id())
            .ok_or(Error::UnknownValue)?;
        let outgoing = cc
            .set_value(&value_id, &value)
            .map_err(|e| Error::InvalidValue(e.to_string()))?;

        node.store.set_pending(&value_id, value);

        for out in outgoing {
            if let Some(message) =
                self.build_cc_message(value_id.node_id(), out, SendPriority::Command)
            {
                self.queue.enqueue(message);
            }
        }
        Ok(())
    }

    fn begin_controller_command(&mut self, command: ControllerCommand) {
        if self.active_controller_command.is_some() {
            self.notifications.push(Notification::ControllerCommand {
                state: ControllerState::Failed,
                error: Some(1),
            });
            return;
        }

        let mut message = command.initial_message();
        // The state machine matches callbacks by this id
        let callback_id = if message.needs_callback_id() {
            let id = self.callback_ids.increment();
            message.command.set_callback_id(Some(id));
            Some(id)
        } else {
            None
        };

        let mut active = ActiveControllerCommand::new(command);
        active.callback_id = callback_id;
        self.active_controller_command = Some(active);

        self.queue.enqueue(message);
        self.notifications.push(Notification::ControllerCommand {
            state: ControllerState::Waiting,
            error: None,
        });
    }

    fn cancel_controller_command(&mut self) {
        let Some(active) = self.active_controller_command.as_ref() else {
            return;
        };
        if !active.command.is_cancellable() {
            self.driver_log()
                .warn(|| "this controller command cannot be cancelled");
            return;
        }
        if let Some(stop) = active.command.stop_message() {
            self.queue.enqueue(stop);
        }
        self.active_controller_command = None;
        self.notifications.push(Notification::ControllerCommand {
            state: ControllerState::Normal,
            error: None,
        });
    }

    // ------------------------------------------------------------------
    // Notifications
    // ------------------------------------------------------------------

    fn push_value_events(&mut self, events: Vec<ValueEvent>) {
        for event in events {
            self.notifications.push(match event {
                ValueEvent::Added(id) => Notification::ValueAdded(id),
                ValueEvent::Changed(id) => Notification::ValueChanged(id),
                ValueEvent::Refreshed(id) => Notification::ValueRefreshed(id),
                ValueEvent::Removed(id) => Notification::ValueRemoved(id),
            });
        }
    }

    /// Safe point: hand queued notifications to the watchers, in order
    fn drain_notifications(&mut self) {
        while let Some(notification) = self.notifications.pop() {
            if !self.watchers.notify(&notification) {
                self.driver_log()
                    .warn(|| "a watcher called back into the driver during notification delivery");
            }
        }
    }
}

fn is_wakeup_no_more_information(message: &Message) -> bool {
    match &message.command {
        Command::SendDataRequest(request) => {
            request.payload == WAKE_UP_NO_MORE_INFORMATION_BYTES
        }
        _ => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use zw_core::encoding::serialize_to_vec;
    use zw_core::values::Decimal;
    use zw_logging::NullSink;
    use zw_serial::command::ApplicationCommandRequest;

    fn test_actor() -> (DriverActor, mpsc::Receiver<RawSerialFrame>) {
        let (serial_tx, serial_out_rx) = mpsc::channel(64);
        let (_event_tx, serial_rx) = mpsc::channel(64);
        let (_input_tx, input_rx) = mpsc::channel(16);

        let mut actor = DriverActor::new(
            DriverOptions::default(),
            Arc::new(NullSink),
            Arc::new(WatcherRegistry::new()),
            None,
            Arc::new(AtomicBool::new(false)),
            serial_rx,
            serial_tx,
            input_rx,
        );
        actor.phase = DriverPhase::Ready;
        actor.controller.home_id = HomeId::new(0xcafe_babe);
        actor.controller.own_node_id = NodeId::new(1);
        (actor, serial_out_rx)
    }

    fn install_node(actor: &mut DriverActor, node_id: u8, cc_ids: &[u8]) {
        let mut node = Node::new(NodeId::new(node_id));
        node.enter_stage(QueryStage::Complete);
        node.queries_complete = true;
        for cc_id in cc_ids {
            node.add_command_class(*cc_id, false);
        }
        actor.nodes.insert(NodeId::new(node_id), node);
    }

    fn application_command(node_id: u8, cc_bytes: &str) -> RawSerialFrame {
        let request = ApplicationCommandRequest {
            rx_status: 0,
            source_node_id: NodeId::new(node_id),
            cc_bytes: hex::decode(cc_bytes).unwrap(),
        };
        let raw = Command::from(request).as_raw().unwrap();
        RawSerialFrame::Data(serialize_to_vec(&raw).unwrap())
    }

    #[test]
    fn test_sensor_report_end_to_end() {
        let (mut actor, mut serial_out) = test_actor();
        install_node(&mut actor, 5, &[0x31]);

        // Temperature report: type 1, precision 1 / scale C / size 2, 4.2
        actor.handle_frame(application_command(5, "31050122002a"));

        // The valid frame was acknowledged
        assert_eq!(
            serial_out.try_recv().unwrap(),
            RawSerialFrame::ControlFlow(ControlFlow::ACK)
        );

        // The value landed in the node's store with its precision intact
        let node = actor.nodes.get(&NodeId::new(5)).unwrap();
        let id = *node.store.ids().next().unwrap();
        assert_eq!(id.command_class_id(), 0x31);
        let stored = node.store.get(&id).unwrap();
        assert_eq!(stored.metadata.units, "C");
        assert_eq!(
            stored.current,
            Some(Value::Decimal(Decimal::new(1, 2, 42)))
        );

        // ValueAdded precedes ValueChanged in the queue
        assert_eq!(actor.notifications.pop(), Some(Notification::ValueAdded(id)));
        assert_eq!(
            actor.notifications.pop(),
            Some(Notification::ValueChanged(id))
        );
    }

    #[test]
    fn test_checksum_error_naks_without_dispatch() {
        let (mut actor, mut serial_out) = test_actor();
        install_node(&mut actor, 5, &[0x31]);

        // A report frame with its checksum byte flipped
        let RawSerialFrame::Data(mut bytes) = application_command(5, "31050122002a") else {
            unreachable!()
        };
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        actor.handle_frame(RawSerialFrame::Data(bytes));

        assert_eq!(
            serial_out.try_recv().unwrap(),
            RawSerialFrame::ControlFlow(ControlFlow::NAK)
        );
        // No values, no notifications
        assert!(actor.nodes.get(&NodeId::new(5)).unwrap().store.is_empty());
        assert!(actor.notifications.is_empty());
    }

    #[test]
    fn test_nak_resends_identical_frame() {
        let (mut actor, mut serial_out) = test_actor();
        install_node(&mut actor, 5, &[0x25]);

        actor.queue.enqueue(Message::new(
            SendDataRequest::new(NodeId::new(5), vec![0x25, 0x02]).into(),
            NodeId::new(5),
            SendPriority::Command,
        ));
        actor.try_send_next();
        let first = serial_out.try_recv().unwrap();

        // The module rejects the frame; the driver resends the identical
        // bytes, including the callback id
        actor.handle_frame(RawSerialFrame::ControlFlow(ControlFlow::NAK));
        let second = serial_out.try_recv().unwrap();
        assert_eq!(first, second);

        let transaction = actor.transaction.as_ref().unwrap();
        assert_eq!(transaction.message.attempts, 2);

        // The retry then succeeds
        actor.handle_frame(RawSerialFrame::ControlFlow(ControlFlow::ACK));
        assert_eq!(
            actor.transaction.as_ref().unwrap().state,
            crate::transaction::TransactionState::WaitingForResponse
        );
    }

    #[test]
    fn test_sleeping_node_parks_and_drains_on_wakeup() {
        let (mut actor, mut serial_out) = test_actor();
        install_node(&mut actor, 7, &[0x20, 0x84]);
        {
            let node = actor.nodes.get_mut(&NodeId::new(7)).unwrap();
            let mut info = NodeProtocolInfo::default();
            info.listening = false;
            node.protocol_info = Some(info);
            node.awake = false;
        }

        // A set for the sleeping node is parked instead of sent
        actor.queue.enqueue(Message::new(
            SendDataRequest::new(NodeId::new(7), vec![0x20, 0x01, 0x63]).into(),
            NodeId::new(7),
            SendPriority::Command,
        ));
        actor.try_send_next();
        assert!(serial_out.try_recv().is_err());
        assert_eq!(
            actor.nodes.get(&NodeId::new(7)).unwrap().wakeup_queue.len(),
            1
        );

        // The node wakes up
        actor.handle_frame(application_command(7, "8407"));
        assert_eq!(
            serial_out.try_recv().unwrap(),
            RawSerialFrame::ControlFlow(ControlFlow::ACK)
        );
        assert!(actor.nodes.get(&NodeId::new(7)).unwrap().is_awake());

        // The parked message replays first, then the node is told it can
        // go back to sleep
        let replayed = actor.queue.dequeue().unwrap();
        assert_eq!(replayed.target, NodeId::new(7));
        assert_eq!(replayed.priority, SendPriority::WakeUp);
        match &replayed.command {
            Command::SendDataRequest(request) => {
                assert_eq!(request.payload, vec![0x20, 0x01, 0x63]);
            }
            other => panic!("expected SendData, got {:?}", other),
        }

        let no_more = actor.queue.dequeue().unwrap();
        assert!(is_wakeup_no_more_information(&no_more));
        assert_eq!(no_more.max_attempts, u8::MAX);
    }

    #[test]
    fn test_interview_resumes_across_wake_cycle() {
        use zw_serial::command::{SendDataCallback, SendDataResponse};

        fn data_frame(command: Command) -> RawSerialFrame {
            RawSerialFrame::Data(serialize_to_vec(&command.as_raw().unwrap()).unwrap())
        }

        let (mut actor, mut serial_out) = test_actor();

        // A battery device in the middle of its interview
        let mut node = Node::new(NodeId::new(7));
        let mut info = NodeProtocolInfo::default();
        info.listening = false;
        node.protocol_info = Some(info);
        node.add_command_class(0x20, false);
        node.add_command_class(0x84, false);
        node.enter_stage(QueryStage::Session);
        actor.nodes.insert(NodeId::new(7), node);

        // The Dynamic stage queues a Basic Get and waits for its report
        actor.advance_node_queries(NodeId::new(7));
        {
            let node = actor.nodes.get(&NodeId::new(7)).unwrap();
            assert_eq!(node.query_stage, QueryStage::Dynamic);
            assert_eq!(node.stage_outstanding, 1);
            assert_eq!(node.stage_reports, vec![(0x20, 0x03)]);
        }

        // The node falls asleep before the frame goes out: it is parked,
        // and the stage keeps waiting
        actor.nodes.get_mut(&NodeId::new(7)).unwrap().awake = false;
        actor.try_send_next();
        assert!(serial_out.try_recv().is_err());
        {
            let node = actor.nodes.get(&NodeId::new(7)).unwrap();
            assert_eq!(node.wakeup_queue.len(), 1);
            assert_eq!(node.stage_outstanding, 1);
        }

        // The node wakes; the parked query replays from the WakeUp band
        actor.handle_frame(application_command(7, "8407"));
        actor.try_send_next();
        let transaction = actor.transaction.as_ref().unwrap();
        assert_eq!(transaction.message.priority, SendPriority::WakeUp);
        assert!(transaction.message.stage_tracked);
        let callback_id = transaction.message.callback_id().unwrap();

        // Deliver it: ACK, response, callback, then the report
        actor.handle_frame(RawSerialFrame::ControlFlow(ControlFlow::ACK));
        actor.handle_frame(data_frame(SendDataResponse { accepted: true }.into()));
        actor.handle_frame(data_frame(
            SendDataCallback {
                callback_id,
                transmit_status: TransmitStatus::Ok,
            }
            .into(),
        ));
        assert!(actor.transaction.is_none());
        actor.handle_frame(application_command(7, "200363"));

        // The replay settled its stage and the interview ran to the end
        let node = actor.nodes.get(&NodeId::new(7)).unwrap();
        assert_eq!(node.query_stage, QueryStage::Complete);
        assert!(node.queries_complete);

        // The only work left is telling the node it can sleep again; it
        // leaves after everything else
        while serial_out.try_recv().is_ok() {}
        actor.try_send_next();
        let RawSerialFrame::Data(bytes) = serial_out.try_recv().unwrap() else {
            panic!("expected the no-more-information frame");
        };
        assert!(bytes.windows(2).any(|window| window == [0x84, 0x08]));
        assert!(actor.queue.is_empty());
    }

    #[test]
    fn test_listening_node_failure_notifies_and_probes() {
        let (mut actor, mut serial_out) = test_actor();
        install_node(&mut actor, 5, &[0x25]);

        // Exhaust the retry budget of a message to a listening node
        for _ in 0..actor.options.node_dead_threshold {
            let mut message = Message::new(
                SendDataRequest::new(NodeId::new(5), vec![0x25, 0x02]).into(),
                NodeId::new(5),
                SendPriority::Command,
            );
            message.attempts = message.max_attempts;
            let transaction =
                Transaction::start(message, Instant::now(), &actor.options.timeouts);
            actor.handle_transaction_failure(transaction, TransactionFailure::AckTimeout);
            while serial_out.try_recv().is_ok() {}
        }

        // Each failure produced a timeout notification...
        let mut timeouts = 0;
        while let Some(notification) = actor.notifications.pop() {
            if matches!(
                notification,
                Notification::Notification {
                    code: NotificationCode::Timeout,
                    ..
                }
            ) {
                timeouts += 1;
            }
        }
        assert_eq!(timeouts, actor.options.node_dead_threshold as usize);

        // ...and the threshold queued an IsFailedNode probe
        let probe = actor.queue.dequeue().unwrap();
        assert!(matches!(
            probe.command,
            Command::IsFailedNodeRequest(_)
        ));
    }
}
