use crate::codec::SerialFrameCodec;
use crate::error::*;
use crate::frame::RawSerialFrame;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tokio_util::codec::{Decoder, Framed};

pub const DEFAULT_BAUD_RATE: u32 = 115_200;

type SerialFramed = Framed<SerialStream, SerialFrameCodec>;
type TcpFramed = Framed<TcpStream, SerialFrameCodec>;

/// The byte-stream transport the driver talks through. Reading yields
/// complete frames; `None` means the device disappeared, which the driver
/// treats as fatal.
pub trait SerialBinding {
    fn write(&mut self, frame: RawSerialFrame) -> impl Future<Output = Result<()>>;
    fn read(&mut self) -> impl Future<Output = Option<RawSerialFrame>>;
}

/// A Z-Wave module attached either locally via USB/serial or remotely via
/// a TCP serial bridge
pub enum ZWavePort {
    Serial(SerialPort),
    Tcp(TcpSocket),
}

impl ZWavePort {
    /// Opens the given path. Addresses of the form `tcp://host:port`
    /// connect to a remote serial bridge, `usb:vid:pid[:serial]`
    /// specifiers are resolved against the attached USB devices, and
    /// everything else is treated as a local serial device.
    pub fn open(path: &str) -> Result<Self> {
        if let Some(addr) = path.strip_prefix("tcp://") {
            return Ok(Self::Tcp(TcpSocket::new(addr)?));
        }
        if let Some(specifier) = path.strip_prefix("usb:") {
            let device = resolve_usb_specifier(specifier)?;
            return Ok(Self::Serial(SerialPort::new(&device)?));
        }
        Ok(Self::Serial(SerialPort::new(path)?))
    }

    /// Splits the port into independently owned halves, so reads and
    /// writes can be driven from different arms of a select loop
    pub fn into_split(self) -> (ZWavePortWriter, ZWavePortReader) {
        match self {
            ZWavePort::Serial(port) => (
                ZWavePortWriter::Serial(port.writer),
                ZWavePortReader::Serial(port.reader),
            ),
            ZWavePort::Tcp(port) => (
                ZWavePortWriter::Tcp(port.writer),
                ZWavePortReader::Tcp(port.reader),
            ),
        }
    }
}

impl SerialBinding for ZWavePort {
    async fn write(&mut self, frame: RawSerialFrame) -> Result<()> {
        match self {
            ZWavePort::Serial(port) => port.write(frame).await,
            ZWavePort::Tcp(port) => port.write(frame).await,
        }
    }

    async fn read(&mut self) -> Option<RawSerialFrame> {
        match self {
            ZWavePort::Serial(port) => port.read().await,
            ZWavePort::Tcp(port) => port.read().await,
        }
    }
}

/// Resolves a `vid:pid[:serial]` specifier to the OS device path of a
/// matching attached USB serial device
fn resolve_usb_specifier(specifier: &str) -> Result<String> {
    fn parse_hex_id(part: &str) -> Option<u16> {
        u16::from_str_radix(part.trim_start_matches("0x"), 16).ok()
    }

    let mut parts = specifier.split(':');
    let (vid, pid) = match (
        parts.next().and_then(parse_hex_id),
        parts.next().and_then(parse_hex_id),
    ) {
        (Some(vid), Some(pid)) => (vid, pid),
        _ => {
            return Err(tokio_serial::Error::new(
                tokio_serial::ErrorKind::InvalidInput,
                format!("invalid USB specifier: {}", specifier),
            )
            .into());
        }
    };
    let serial_number = parts.next();

    for port in tokio_serial::available_ports()? {
        let tokio_serial::SerialPortType::UsbPort(usb) = &port.port_type else {
            continue;
        };
        if usb.vid != vid || usb.pid != pid {
            continue;
        }
        if let Some(wanted) = serial_number
            && usb.serial_number.as_deref() != Some(wanted)
        {
            continue;
        }
        return Ok(port.port_name);
    }

    Err(tokio_serial::Error::new(
        tokio_serial::ErrorKind::NoDevice,
        format!("no USB device matches {}", specifier),
    )
    .into())
}

pub enum ZWavePortWriter {
    Serial(SplitSink<SerialFramed, RawSerialFrame>),
    Tcp(SplitSink<TcpFramed, RawSerialFrame>),
}

impl ZWavePortWriter {
    pub async fn write(&mut self, frame: RawSerialFrame) -> Result<()> {
        match self {
            ZWavePortWriter::Serial(writer) => writer.send(frame).await?,
            ZWavePortWriter::Tcp(writer) => writer.send(frame).await?,
        }
        Ok(())
    }
}

pub enum ZWavePortReader {
    Serial(SplitStream<SerialFramed>),
    Tcp(SplitStream<TcpFramed>),
}

impl ZWavePortReader {
    pub async fn read(&mut self) -> Option<RawSerialFrame> {
        let next = match self {
            ZWavePortReader::Serial(reader) => reader.next().await,
            ZWavePortReader::Tcp(reader) => reader.next().await,
        };
        match next {
            Some(Ok(frame)) => Some(frame),
            _ => None,
        }
    }
}

pub struct SerialPort {
    writer: SplitSink<SerialFramed, RawSerialFrame>,
    reader: SplitStream<SerialFramed>,
}

impl SerialPort {
    pub fn new(path: &str) -> Result<Self> {
        #[allow(unused_mut)]
        let mut port = tokio_serial::new(path, DEFAULT_BAUD_RATE).open_native_async()?;

        #[cfg(unix)]
        port.set_exclusive(false)
            .expect("Unable to set serial port exclusive to false");
        let codec = SerialFrameCodec.framed(port);
        let (writer, reader) = codec.split();
        Ok(Self { writer, reader })
    }
}

impl SerialBinding for SerialPort {
    async fn write(&mut self, frame: RawSerialFrame) -> Result<()> {
        self.writer.send(frame).await?;
        Ok(())
    }

    async fn read(&mut self) -> Option<RawSerialFrame> {
        match self.reader.next().await {
            Some(Ok(frame)) => Some(frame),
            _ => None,
        }
    }
}

pub struct TcpSocket {
    writer: SplitSink<TcpFramed, RawSerialFrame>,
    reader: SplitStream<TcpFramed>,
}

impl TcpSocket {
    pub fn new(addr: &str) -> Result<Self> {
        let stream = std::net::TcpStream::connect(addr)?;
        stream.set_nonblocking(true)?;
        let stream = TcpStream::from_std(stream)?;

        let codec = SerialFrameCodec.framed(stream);
        let (writer, reader) = codec.split();
        Ok(Self { writer, reader })
    }
}

impl SerialBinding for TcpSocket {
    async fn write(&mut self, frame: RawSerialFrame) -> Result<()> {
        self.writer.send(frame).await?;
        Ok(())
    }

    async fn read(&mut self) -> Option<RawSerialFrame> {
        match self.reader.next().await {
            Some(Ok(frame)) => Some(frame),
            _ => None,
        }
    }
}
