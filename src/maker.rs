use crate::connection::Connection;
use crate::error::Result;
use crate::monitor;
use crate::protocol::{self, CarafePolarity, Frame};
use crate::subscription::StateReceiver;
use crate::types::{CommandStatus, DeviceDescriptor, DeviceState, Strength};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

/// Control facade for one coffee maker
///
/// Owns the control connection and the monitor task. Control operations
/// return the device-reported [`CommandStatus`]; a rejected command (no
/// carafe, not enough water, ...) is a status, not an error. All operations
/// are serialized on the connection; the wire protocol is half-duplex with
/// positional reply correlation.
///
/// # Example
///
/// ```no_run
/// use smarter_coffee::{CoffeeMaker, Discovery, Strength};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let devices = Discovery::new().find(Duration::from_secs(15)).await?;
///     let maker = devices[0].connect(Duration::from_secs(10)).await?;
///
///     maker.start_monitoring();
///     let status = maker.brew(4, Strength::Medium, true, 10).await?;
///     println!("brew: {}", status);
///
///     let mut updates = maker.subscribe();
///     while let Ok(state) = updates.recv().await {
///         println!("state: {:?}", state.brew_state);
///     }
///
///     maker.stop_monitoring().await;
///     Ok(())
/// }
/// ```
pub struct CoffeeMaker {
    descriptor: DeviceDescriptor,
    connection: Arc<Connection>,
    monitor: StdMutex<Option<MonitorHandle>>,
}

struct MonitorHandle {
    stop_tx: broadcast::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl CoffeeMaker {
    /// Facade for a discovered device, default carafe polarity
    pub fn new(descriptor: DeviceDescriptor) -> Self {
        Self::with_polarity(descriptor, CarafePolarity::default())
    }

    /// Facade with an explicit carafe-detection polarity for older firmware
    pub fn with_polarity(descriptor: DeviceDescriptor, polarity: CarafePolarity) -> Self {
        let connection = Arc::new(Connection::new(
            descriptor.host.address.clone(),
            descriptor.host.port,
            polarity,
        ));
        Self {
            descriptor,
            connection,
            monitor: StdMutex::new(None),
        }
    }

    /// The discovery descriptor this facade was built from
    pub fn descriptor(&self) -> &DeviceDescriptor {
        &self.descriptor
    }

    /// Snapshot of the cached device state
    pub fn state(&self) -> DeviceState {
        self.connection.state()
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    /// Open the control connection; no-op when already connected
    ///
    /// On success the device defaults have been read and folded into the
    /// cached state.
    pub async fn connect(&self, connect_timeout: Duration) -> Result<()> {
        self.connection.connect(connect_timeout).await
    }

    /// Close the control connection without stopping the monitor
    pub async fn disconnect(&self) {
        self.connection.disconnect().await;
    }

    /// Start the background monitor loop; no-op when already running
    ///
    /// The loop keeps cached state fresh from unsolicited status pushes and
    /// reconnects with backoff after connection loss. Updates fan out to
    /// every [`subscribe`](Self::subscribe) receiver.
    pub fn start_monitoring(&self) {
        let mut monitor = self.monitor.lock().unwrap();
        if monitor.is_some() {
            tracing::debug!("already monitoring");
            return;
        }
        let (stop_tx, _) = broadcast::channel(1);
        let task = monitor::spawn(self.connection.clone(), stop_tx.clone());
        *monitor = Some(MonitorHandle { stop_tx, task });
    }

    /// Stop the monitor loop and disconnect; no-op when not running
    pub async fn stop_monitoring(&self) {
        let handle = self.monitor.lock().unwrap().take();
        let Some(handle) = handle else {
            tracing::debug!("monitor already stopped");
            return;
        };
        let _ = handle.stop_tx.send(());
        self.connection.disconnect().await;
        if timeout(Duration::from_secs(1), handle.task).await.is_err() {
            tracing::warn!("monitor task did not stop in time");
        }
    }

    /// Subscribe to device state updates
    ///
    /// Multiple subscriptions can be active simultaneously.
    pub fn subscribe(&self) -> StateReceiver {
        StateReceiver::new(self.connection.subscribe())
    }

    // ========== Brewing ==========

    /// Brew with explicit parameters
    ///
    /// Cups clamp to 1–12 (default 3), hot plate minutes to 0–40 (default
    /// 5); out-of-range values fall back silently, they are never rejected.
    pub async fn brew(
        &self,
        cups: u8,
        strength: Strength,
        grind: bool,
        hot_plate_minutes: u8,
    ) -> Result<CommandStatus> {
        let cups = protocol::clamp_or_default(cups, 1, 12, 3);
        let minutes = protocol::clamp_or_default(hot_plate_minutes, 0, 40, 5);
        tracing::info!(
            "brew: {} cups, {:?}, grind {}, hot plate {} min",
            cups,
            strength,
            grind,
            minutes
        );
        // the status stream does not echo the plate timer back
        self.connection.update_state(|s| s.hot_plate_minutes = minutes);
        self.send_expect_ack(protocol::brew_command(cups, strength, minutes, grind))
            .await
    }

    /// Brew with the device's stored defaults
    pub async fn start_brew(&self) -> Result<CommandStatus> {
        self.send_expect_ack(protocol::command(protocol::CMD_BREW_DEFAULT))
            .await
    }

    /// Stop the current brew
    pub async fn stop_brew(&self) -> Result<CommandStatus> {
        self.send_expect_ack(protocol::command(protocol::CMD_BREW_STOP))
            .await
    }

    // ========== Settings ==========

    /// Set the number of cups, clamped to 1–12 (default 3)
    pub async fn set_cups(&self, cups: u8) -> Result<CommandStatus> {
        let cups = protocol::clamp_or_default(cups, 1, 12, 3);
        self.send_expect_ack(protocol::command_with_value(protocol::CMD_SET_CUPS, cups))
            .await
    }

    /// Set the coffee strength
    pub async fn set_strength(&self, strength: Strength) -> Result<CommandStatus> {
        self.send_expect_ack(protocol::command_with_value(
            protocol::CMD_SET_STRENGTH,
            strength.as_byte(),
        ))
        .await
    }

    /// Enable or disable grinding from beans
    ///
    /// The protocol only exposes a toggle, so this checks cached state
    /// first and no-ops with [`CommandStatus::Ok`] when nothing would
    /// change.
    pub async fn set_use_beans(&self, enabled: bool) -> Result<CommandStatus> {
        if self.state().use_beans == enabled {
            tracing::debug!("use beans already {}", enabled);
            return Ok(CommandStatus::Ok);
        }
        self.send_expect_ack(protocol::command(protocol::CMD_TOGGLE_BEANS))
            .await
    }

    /// Turn the hot plate on for `minutes`, clamped to 5–40 (default 5)
    pub async fn turn_hot_plate_on(&self, minutes: u8) -> Result<CommandStatus> {
        let minutes = protocol::clamp_or_default(minutes, 5, 40, 5);
        self.connection.update_state(|s| s.hot_plate_minutes = minutes);
        self.send_expect_ack(protocol::command_with_value(
            protocol::CMD_HOT_PLATE_ON,
            minutes,
        ))
        .await
    }

    pub async fn turn_hot_plate_off(&self) -> Result<CommandStatus> {
        self.send_expect_ack(protocol::command(protocol::CMD_HOT_PLATE_OFF))
            .await
    }

    /// Enable or disable carafe detection
    ///
    /// The flag direction on the wire follows the configured
    /// [`CarafePolarity`]. The cached value is set optimistically; the
    /// device reports it back only on explicit fetch.
    pub async fn set_carafe_detection(&self, enabled: bool) -> Result<CommandStatus> {
        self.connection.update_state(|s| s.carafe_detection = enabled);
        let flag = self.connection.polarity().encode(enabled);
        self.send_expect_ack(protocol::command_with_value(
            protocol::CMD_SET_CARAFE_DETECTION,
            flag,
        ))
        .await
    }

    /// Switch between one-cup and carafe mode
    pub async fn set_one_cup_mode(&self, enabled: bool) -> Result<CommandStatus> {
        self.send_expect_ack(protocol::command_with_value(
            protocol::CMD_SET_ONE_CUP_MODE,
            u8::from(enabled),
        ))
        .await
    }

    /// Ask the device whether carafe detection is enabled
    pub async fn fetch_carafe_detection(&self) -> Result<bool> {
        match self
            .connection
            .send_command(protocol::command(protocol::CMD_GET_CARAFE_DETECTION))
            .await?
        {
            Frame::CarafeDetection(enabled) => Ok(enabled),
            other => {
                tracing::debug!("interleaved reply {:?}", other);
                Ok(self.state().carafe_detection)
            }
        }
    }

    /// Ask the device whether one-cup mode is active
    pub async fn fetch_one_cup_mode(&self) -> Result<bool> {
        match self
            .connection
            .send_command(protocol::command(protocol::CMD_GET_ONE_CUP_MODE))
            .await?
        {
            Frame::OneCupMode(enabled) => Ok(enabled),
            other => {
                tracing::debug!("interleaved reply {:?}", other);
                Ok(self.state().one_cup_mode)
            }
        }
    }

    async fn send_expect_ack(&self, frame: Vec<u8>) -> Result<CommandStatus> {
        match self.connection.send_command(frame).await? {
            Frame::CommandAck(status) => {
                if !status.is_ok() {
                    tracing::warn!("device rejected command: {status}");
                }
                Ok(status)
            }
            other => {
                // a different reply slipped in ahead of the ack; its state
                // change has already been folded in
                tracing::debug!("non-ack reply {:?}", other);
                Ok(CommandStatus::Ok)
            }
        }
    }
}
