use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Frames buffered between two poll ticks. Once full, newly received frames are dropped.
pub const FRAME_BUFFER_CAPACITY: usize = 64;

/// Largest datagram the bridge accepts: two header bytes plus the longest radio frame.
const MAX_DATAGRAM_LEN: usize = 2 + 255;

/// A frame as handed over by the radio, before any protocol decoding
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub bytes: Vec<u8>,
    /// Signal strength in dBm
    pub rssi: f32,
    /// CRC status reported by the radio
    pub crc_ok: bool,
    pub received_at: Instant,
}

impl RawFrame {
    pub fn new(bytes: Vec<u8>, rssi: f32) -> Self {
        Self {
            bytes,
            rssi,
            crc_ok: true,
            received_at: Instant::now(),
        }
    }

    pub fn with_crc_error(mut self) -> Self {
        self.crc_ok = false;
        self
    }
}

/// A LoRa-class radio seen as a source of frames and a sink for packets to transmit.
///
/// Reception may happen at any time (interrupts, a socket task), but frames are only
/// handed out through [`RadioLink::drain`], which the poll tick calls.
pub trait RadioLink: Send {
    /// Returns every frame received since the last call, oldest first
    fn drain(&mut self) -> Vec<RawFrame>;

    /// Queues a packet for transmission
    fn transmit(&mut self, packet: &[u8]) -> anyhow::Result<()>;
}

/// Radio link backed by a pair of bounded channels.
///
/// Whatever owns the [`RadioHandle`] plays the part of the physical radio: it pushes
/// received frames in and picks transmitted packets up.
pub struct BufferedRadio {
    frames: Receiver<RawFrame>,
    outbound: Sender<Vec<u8>>,
}

/// The radio-facing side of a [`BufferedRadio`]
pub struct RadioHandle {
    pub frames: Sender<RawFrame>,
    pub outbound: Receiver<Vec<u8>>,
}

impl BufferedRadio {
    pub fn new() -> (Self, RadioHandle) {
        let (frame_tx, frame_rx) = mpsc::channel(FRAME_BUFFER_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(FRAME_BUFFER_CAPACITY);
        (
            Self {
                frames: frame_rx,
                outbound: outbound_tx,
            },
            RadioHandle {
                frames: frame_tx,
                outbound: outbound_rx,
            },
        )
    }
}

impl RadioLink for BufferedRadio {
    fn drain(&mut self) -> Vec<RawFrame> {
        let mut frames = Vec::new();
        // Bounded by the channel capacity, so a tick never spins here
        while let Ok(frame) = self.frames.try_recv() {
            frames.push(frame);
        }
        frames
    }

    fn transmit(&mut self, packet: &[u8]) -> anyhow::Result<()> {
        match self.outbound.try_send(packet.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => anyhow::bail!("Radio transmit queue is full"),
            Err(TrySendError::Closed(_)) => anyhow::bail!("Radio transmitter has shut down"),
        }
    }
}

/// Radio link fed by a UDP bridge in front of the physical SX126x.
///
/// Each datagram carries one frame: byte 0 is the RSSI as a signed dBm value, byte 1 is a
/// status byte whose bit 0 flags a valid CRC, and the remainder is the frame payload.
/// Packets to transmit are sent back raw to whichever bridge spoke last.
pub struct UdpRadioBridge;

impl UdpRadioBridge {
    /// Binds the bridge socket and spawns its receive and transmit tasks
    pub async fn bind(bind_address: SocketAddr) -> anyhow::Result<(BufferedRadio, SocketAddr)> {
        let socket = Arc::new(UdpSocket::bind(bind_address).await?);
        let local_address = socket.local_addr()?;
        info!("Radio bridge listening on {local_address}");

        let (radio, handle) = BufferedRadio::new();
        let peer = Arc::new(Mutex::new(None));

        tokio::spawn(Self::receive_loop(
            socket.clone(),
            handle.frames,
            peer.clone(),
        ));
        tokio::spawn(Self::transmit_loop(socket, handle.outbound, peer));

        Ok((radio, local_address))
    }

    async fn receive_loop(
        socket: Arc<UdpSocket>,
        frames: Sender<RawFrame>,
        peer: Arc<Mutex<Option<SocketAddr>>>,
    ) {
        let mut buffer = [0u8; MAX_DATAGRAM_LEN];
        loop {
            let (len, source) = match socket.recv_from(&mut buffer).await {
                Ok(received) => received,
                Err(e) => {
                    warn!("Radio bridge receive failed: {e}");
                    continue;
                }
            };
            *peer.lock().await = Some(source);

            let Some(frame) = parse_bridge_datagram(&buffer[..len]) else {
                debug!("Ignoring short bridge datagram ({len} bytes) from {source}");
                continue;
            };
            match frames.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!("Radio frame buffer full, dropping frame from {source}");
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }
        info!("Radio bridge receiver exiting");
    }

    async fn transmit_loop(
        socket: Arc<UdpSocket>,
        mut outbound: Receiver<Vec<u8>>,
        peer: Arc<Mutex<Option<SocketAddr>>>,
    ) {
        while let Some(packet) = outbound.recv().await {
            let target = *peer.lock().await;
            let Some(target) = target else {
                warn!("No radio bridge has connected yet, dropping {} byte packet", packet.len());
                continue;
            };
            if let Err(e) = socket.send_to(&packet, target).await {
                warn!("Radio bridge transmit to {target} failed: {e}");
            }
        }
        info!("Radio bridge transmitter exiting");
    }
}

/// Splits a bridge datagram into its RSSI/status header and frame payload
pub fn parse_bridge_datagram(datagram: &[u8]) -> Option<RawFrame> {
    let (&[rssi, status], payload) = datagram.split_first_chunk::<2>()?;
    let frame = RawFrame::new(payload.to_vec(), f32::from(rssi as i8));
    Some(if status & 0x01 == 0 {
        frame.with_crc_error()
    } else {
        frame
    })
}
