use crate::actor::{DriverActor, SerialEvent};
use crate::controller_commands::ControllerCommand;
use crate::error::{Error, Result};
use crate::notification::{Notification, WatcherRegistry, WatcherId};
use crate::options::DriverOptions;
use crate::storage::JsonFileSerializer;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use zw_core::definitions::NodeId;
use zw_core::value_id::ValueId;
use zw_core::value_store::StoredValue;
use zw_core::values::Value;
use zw_logging::{ConsoleSink, FileSink, LogSink, NullSink};
use zw_serial::binding::{ZWavePort, ZWavePortReader, ZWavePortWriter};
use zw_serial::frame::RawSerialFrame;

/// Requests the embedder hands to the driver task
#[derive(Debug)]
pub enum DriverInput {
    SetValue {
        value_id: ValueId,
        value: Value,
        reply: oneshot::Sender<Result<()>>,
    },
    GetValue {
        value_id: ValueId,
        reply: oneshot::Sender<Option<StoredValue>>,
    },
    /// Refresh a single value from the device
    RequestValue { value_id: ValueId },
    SetConfigParam {
        node_id: NodeId,
        param: u8,
        value: i64,
        size: u8,
    },
    RequestConfigParam { node_id: NodeId, param: u8 },
    GetAssociations {
        node_id: NodeId,
        group_idx: u8,
        reply: oneshot::Sender<Vec<(NodeId, Option<u8>)>>,
    },
    AddAssociation {
        node_id: NodeId,
        group_idx: u8,
        target: NodeId,
    },
    RemoveAssociation {
        node_id: NodeId,
        group_idx: u8,
        target: NodeId,
    },
    BeginControllerCommand { command: ControllerCommand },
    CancelControllerCommand,
    EnablePoll { value_id: ValueId, intensity: u8 },
    DisablePoll { value_id: ValueId },
    SetPollInterval { interval: Duration },
    /// Re-run the whole interview for a node
    RefreshNodeInfo { node_id: NodeId },
    SoftReset,
    Shutdown,
}

/// The embedder-facing handle. Cheap to clone; all real work happens on
/// the driver task.
#[derive(Clone)]
pub struct Driver {
    input_tx: mpsc::Sender<DriverInput>,
    watchers: Arc<WatcherRegistry>,
    ready: Arc<AtomicBool>,
}

impl Driver {
    /// Opens the serial device (or `tcp://host:port` bridge) and starts
    /// the driver, reader and serial tasks. Returns the handle plus the
    /// join handle of the driver task.
    pub fn open(
        path: &str,
        options: DriverOptions,
    ) -> Result<(Self, tokio::task::JoinHandle<()>)> {
        let port = ZWavePort::open(path)?;

        let sink: Arc<dyn LogSink> = if !options.logging_enabled {
            Arc::new(NullSink)
        } else if let Some(log_file) = &options.log_file {
            Arc::new(
                FileSink::new(log_file, options.log_level, options.append_log)
                    .map_err(zw_serial::error::Error::from)?,
            )
        } else {
            Arc::new(ConsoleSink::new(options.log_level))
        };

        let serializer = options.state_path.as_ref().map(|path| {
            Box::new(JsonFileSerializer::new(path.clone()))
                as Box<dyn crate::storage::StateSerializer>
        });

        let watchers = Arc::new(WatcherRegistry::new());
        let ready = Arc::new(AtomicBool::new(false));

        let (serial_event_tx, serial_event_rx) = mpsc::channel(64);
        let (serial_out_tx, serial_out_rx) = mpsc::channel(64);
        let (input_tx, input_rx) = mpsc::channel(16);

        let (port_writer, port_reader) = port.into_split();
        tokio::spawn(serial_task(
            port_writer,
            port_reader,
            serial_event_tx,
            serial_out_rx,
        ));

        let mut actor = DriverActor::new(
            options,
            sink,
            watchers.clone(),
            serializer,
            ready.clone(),
            serial_event_rx,
            serial_out_tx,
            input_rx,
        );
        let join = tokio::spawn(async move { actor.run().await });

        Ok((
            Self {
                input_tx,
                watchers,
                ready,
            },
            join,
        ))
    }

    /// Whether the startup identification sequence has finished
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    /// Registers a callback for every notification the driver produces.
    /// Callbacks run synchronously on the driver task and must not call
    /// back into the driver.
    pub fn add_watcher(
        &self,
        watcher: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> WatcherId {
        self.watchers.add(watcher)
    }

    pub fn remove_watcher(&self, id: WatcherId) -> bool {
        self.watchers.remove(id)
    }

    fn send(&self, input: DriverInput) -> Result<()> {
        self.input_tx.try_send(input).map_err(|_| Error::Shutdown)
    }

    /// Requests a change of the given value. The result confirms the
    /// request was accepted; the new value is committed when the device
    /// reports it back.
    pub async fn set_value(&self, value_id: ValueId, value: Value) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(DriverInput::SetValue {
            value_id,
            value,
            reply,
        })?;
        rx.await.map_err(|_| Error::Shutdown)?
    }

    pub async fn get_value(&self, value_id: ValueId) -> Result<Option<StoredValue>> {
        let (reply, rx) = oneshot::channel();
        self.send(DriverInput::GetValue { value_id, reply })?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    pub fn request_value(&self, value_id: ValueId) -> Result<()> {
        self.send(DriverInput::RequestValue { value_id })
    }

    pub fn set_config_param(
        &self,
        node_id: NodeId,
        param: u8,
        value: i64,
        size: u8,
    ) -> Result<()> {
        self.send(DriverInput::SetConfigParam {
            node_id,
            param,
            value,
            size,
        })
    }

    pub fn request_config_param(&self, node_id: NodeId, param: u8) -> Result<()> {
        self.send(DriverInput::RequestConfigParam { node_id, param })
    }

    pub async fn get_associations(
        &self,
        node_id: NodeId,
        group_idx: u8,
    ) -> Result<Vec<(NodeId, Option<u8>)>> {
        let (reply, rx) = oneshot::channel();
        self.send(DriverInput::GetAssociations {
            node_id,
            group_idx,
            reply,
        })?;
        rx.await.map_err(|_| Error::Shutdown)
    }

    pub fn add_association(
        &self,
        node_id: NodeId,
        group_idx: u8,
        target: NodeId,
    ) -> Result<()> {
        self.send(DriverInput::AddAssociation {
            node_id,
            group_idx,
            target,
        })
    }

    pub fn remove_association(
        &self,
        node_id: NodeId,
        group_idx: u8,
        target: NodeId,
    ) -> Result<()> {
        self.send(DriverInput::RemoveAssociation {
            node_id,
            group_idx,
            target,
        })
    }

    pub fn begin_controller_command(&self, command: ControllerCommand) -> Result<()> {
        self.send(DriverInput::BeginControllerCommand { command })
    }

    pub fn cancel_controller_command(&self) -> Result<()> {
        self.send(DriverInput::CancelControllerCommand)
    }

    pub fn enable_poll(&self, value_id: ValueId, intensity: u8) -> Result<()> {
        self.send(DriverInput::EnablePoll {
            value_id,
            intensity,
        })
    }

    pub fn disable_poll(&self, value_id: ValueId) -> Result<()> {
        self.send(DriverInput::DisablePoll { value_id })
    }

    pub fn set_poll_interval(&self, interval: Duration) -> Result<()> {
        self.send(DriverInput::SetPollInterval { interval })
    }

    pub fn refresh_node_info(&self, node_id: NodeId) -> Result<()> {
        self.send(DriverInput::RefreshNodeInfo { node_id })
    }

    pub fn soft_reset(&self) -> Result<()> {
        self.send(DriverInput::SoftReset)
    }

    /// Signals the driver to drain, persist its state and exit
    pub fn close(&self) -> Result<()> {
        self.send(DriverInput::Shutdown)
    }
}

/// The task owning the serial port: forwards decoded frames to the driver
/// task and writes outbound frames. Ends when either the port or the
/// driver disappears.
async fn serial_task(
    mut writer: ZWavePortWriter,
    mut reader: ZWavePortReader,
    events: mpsc::Sender<SerialEvent>,
    mut outbound: mpsc::Receiver<RawSerialFrame>,
) {
    loop {
        tokio::select! {
            frame = reader.read() => match frame {
                Some(frame) => {
                    if events.send(SerialEvent::Frame(frame)).await.is_err() {
                        return;
                    }
                }
                None => {
                    let _ = events.send(SerialEvent::Disconnected).await;
                    return;
                }
            },
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if writer.write(frame).await.is_err() {
                        let _ = events.send(SerialEvent::Disconnected).await;
                        return;
                    }
                }
                None => return,
            },
        }
    }
}
