use crate::error::{Result, SmarterError};
use crate::protocol::{self, CarafePolarity, Frame};
use crate::types::DeviceState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{timeout, timeout_at, Instant};

/// Hard deadline for every individual connect, write+read and poll read
pub(crate) const IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Frames are small; one read comfortably holds a few back-to-back frames
const READ_BUF: usize = 64;

/// TCP connection manager for one appliance
///
/// Owns the socket behind a suspend-aware mutex. The lock is held for the
/// duration of one write+read cycle: the protocol has no request ids, so
/// whichever non-status frame arrives next on the socket after a command is
/// that command's reply. Single-flight serialization is correctness, not
/// an optimization. Cached state is only ever written from the I/O paths
/// below; everyone else reads clones.
pub(crate) struct Connection {
    host: String,
    port: u16,
    polarity: CarafePolarity,
    io: Mutex<Option<TcpStream>>,
    closing: AtomicBool,
    state: StdMutex<DeviceState>,
    /// Per-connection update fan-out; subscribers get full snapshots
    update_tx: broadcast::Sender<DeviceState>,
}

impl Connection {
    pub(crate) fn new(host: impl Into<String>, port: u16, polarity: CarafePolarity) -> Self {
        let (update_tx, _) = broadcast::channel(100);
        Self {
            host: host.into(),
            port,
            polarity,
            io: Mutex::new(None),
            closing: AtomicBool::new(false),
            state: StdMutex::new(DeviceState::default()),
            update_tx,
        }
    }

    pub(crate) fn host(&self) -> &str {
        &self.host
    }

    pub(crate) fn polarity(&self) -> CarafePolarity {
        self.polarity
    }

    /// Snapshot of the cached device state
    pub(crate) fn state(&self) -> DeviceState {
        self.state.lock().unwrap().clone()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<DeviceState> {
        self.update_tx.subscribe()
    }

    /// Apply a targeted state change outside the decode path
    ///
    /// Used for the optimistic updates the protocol requires (hot plate
    /// minutes, forced carafe-detection flag).
    pub(crate) fn update_state(&self, apply: impl FnOnce(&mut DeviceState)) {
        apply(&mut self.state.lock().unwrap());
    }

    pub(crate) fn set_available(&self, available: bool) {
        self.state.lock().unwrap().available = available;
        self.notify();
    }

    fn notify(&self) {
        let _ = self.update_tx.send(self.state());
    }

    pub(crate) async fn is_connected(&self) -> bool {
        self.io.lock().await.is_some()
    }

    /// Open the control connection; no-op when already connected
    pub(crate) async fn connect(&self, connect_timeout: Duration) -> Result<()> {
        let mut io = self.io.lock().await;
        if io.is_some() {
            tracing::debug!("already connected to {}", self.host);
            return Ok(());
        }
        self.open_locked(&mut io, connect_timeout).await
    }

    async fn open_locked(
        &self,
        io: &mut Option<TcpStream>,
        connect_timeout: Duration,
    ) -> Result<()> {
        let stream = timeout(
            connect_timeout,
            TcpStream::connect((self.host.as_str(), self.port)),
        )
        .await
        .map_err(|_| SmarterError::Timeout)??;

        tracing::info!("connection established to {}:{}", self.host, self.port);
        *io = Some(stream);

        // seed cached state with the device defaults
        let seeded = self
            .request_locked(io.as_mut().unwrap(), &protocol::command(protocol::CMD_GET_DEFAULTS))
            .await;
        if let Err(e) = seeded {
            tracing::warn!("failed to read defaults from {}: {}", self.host, e);
            *io = None;
            return Err(e);
        }
        Ok(())
    }

    /// Send one command frame and wait for its correlated reply
    ///
    /// Status pushes interleaved ahead of the reply are folded into cached
    /// state and skipped; the first non-status frame is the reply. Rejected
    /// immediately while a disconnect is in progress. Any I/O fault drops
    /// the stream so the monitor loop owns the retry.
    pub(crate) async fn send_command(&self, frame: Vec<u8>) -> Result<Frame> {
        if self.closing.load(Ordering::SeqCst) {
            tracing::warn!("disconnect in progress, rejecting command {:02x?}", frame);
            return Err(SmarterError::Disconnecting);
        }

        let mut io = self.io.lock().await;
        if io.is_none() {
            self.open_locked(&mut io, IO_TIMEOUT).await?;
        }

        let result = self.request_locked(io.as_mut().unwrap(), &frame).await;
        if matches!(
            result,
            Err(SmarterError::Io(_)) | Err(SmarterError::Timeout) | Err(SmarterError::ConnectionClosed)
        ) {
            // fail closed; reconnect is the monitor loop's job
            *io = None;
        }
        result
    }

    /// Write one frame and read until its correlated reply arrives
    ///
    /// Caller must hold the io lock.
    async fn request_locked(&self, stream: &mut TcpStream, frame: &[u8]) -> Result<Frame> {
        tracing::debug!("sending {:02x?}", frame);
        stream.write_all(frame).await?;

        let deadline = Instant::now() + IO_TIMEOUT;
        let mut buf = [0u8; READ_BUF];
        loop {
            let n = timeout_at(deadline, stream.read(&mut buf))
                .await
                .map_err(|_| SmarterError::Timeout)??;
            if n == 0 {
                tracing::info!("connection closed by device mid-command");
                return Err(SmarterError::ConnectionClosed);
            }
            tracing::debug!("received {:02x?}", &buf[..n]);
            if let Some(reply) = self.apply_raw(&buf[..n]) {
                return reply;
            }
            // only unsolicited status arrived; the reply is still pending
        }
    }

    /// One monitor-loop read under the io lock
    ///
    /// `previous` carries the last raw payload so an unchanged push is not
    /// re-decoded or re-notified. A zero-length read means the device hung
    /// up; read errors and timeouts also drop the stream.
    pub(crate) async fn poll_status(&self, previous: &mut Vec<u8>) -> Result<()> {
        let mut io = self.io.lock().await;
        let stream = io.as_mut().ok_or(SmarterError::NotConnected)?;

        let mut buf = [0u8; READ_BUF];
        let n = match timeout(IO_TIMEOUT, stream.read(&mut buf)).await {
            Ok(Ok(n)) => n,
            Ok(Err(e)) => {
                *io = None;
                return Err(e.into());
            }
            Err(_) => {
                *io = None;
                return Err(SmarterError::Timeout);
            }
        };
        if n == 0 {
            tracing::info!("connection closed by device");
            *io = None;
            return Err(SmarterError::ConnectionClosed);
        }

        let data = &buf[..n];
        if previous.as_slice() != data {
            tracing::debug!("received {:02x?}", data);
            self.apply_raw(data);
            previous.clear();
            previous.extend_from_slice(data);
        }
        Ok(())
    }

    /// Decode every frame in a raw read, fold results into cached state and
    /// notify subscribers once. Returns the first non-status frame (the
    /// correlated reply), if any; an ack carrying a result code outside the
    /// reply table is surfaced as that reply's error.
    fn apply_raw(&self, data: &[u8]) -> Option<Result<Frame>> {
        let mut reply: Option<Result<Frame>> = None;
        {
            let mut state = self.state.lock().unwrap();
            for raw in protocol::split_frames(data) {
                match protocol::decode_frame(raw, self.polarity) {
                    Ok(frame) => {
                        match &frame {
                            Frame::Status(status) => status.apply_to(&mut state),
                            Frame::Defaults(defaults) => defaults.apply_to(&mut state),
                            Frame::CarafeDetection(enabled) => state.carafe_detection = *enabled,
                            Frame::OneCupMode(enabled) => state.one_cup_mode = *enabled,
                            Frame::CommandAck(status) => {
                                tracing::debug!("command result: {status}");
                            }
                        }
                        if reply.is_none() && !matches!(frame, Frame::Status(_)) {
                            reply = Some(Ok(frame));
                        }
                    }
                    Err(SmarterError::UnknownReply(code)) => {
                        tracing::warn!("device ack with unknown result code {:#04x}", code);
                        if reply.is_none() {
                            reply = Some(Err(SmarterError::UnknownReply(code)));
                        }
                    }
                    Err(e) => tracing::warn!("skipping undecodable frame {:02x?}: {}", raw, e),
                }
            }
        }
        self.notify();
        reply
    }

    /// Drop the stream without touching availability; monitor error path
    pub(crate) async fn drop_stream(&self) {
        *self.io.lock().await = None;
    }

    /// Close the connection; no-op when already closed
    ///
    /// The socket is dropped without awaiting graceful close; the
    /// appliance is known to hang there, and shutdown must not block on it.
    pub(crate) async fn disconnect(&self) {
        self.closing.store(true, Ordering::SeqCst);
        {
            let mut io = self.io.lock().await;
            if io.take().is_some() {
                tracing::info!("connection to {} closed", self.host);
            } else {
                tracing::debug!("already disconnected from {}", self.host);
            }
        }
        self.closing.store(false, Ordering::SeqCst);
    }
}
