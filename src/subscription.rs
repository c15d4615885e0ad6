use crate::error::{Result, SmarterError};
use crate::types::DeviceState;
use tokio::sync::broadcast;

/// Receiver for device state updates
///
/// Each update is a full [`DeviceState`] snapshot taken after a raw read
/// was folded in or availability flipped.
pub struct StateReceiver {
    rx: broadcast::Receiver<DeviceState>,
}

impl StateReceiver {
    pub(crate) fn new(rx: broadcast::Receiver<DeviceState>) -> Self {
        Self { rx }
    }

    /// Receive the next state snapshot
    pub async fn recv(&mut self) -> Result<DeviceState> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => SmarterError::ConnectionClosed,
            broadcast::error::RecvError::Lagged(n) => {
                SmarterError::Channel(format!("lagged by {} updates", n))
            }
        })
    }

    /// Try to receive a state snapshot without blocking
    ///
    /// Returns `None` if no update is pending.
    pub fn try_recv(&mut self) -> Result<Option<DeviceState>> {
        match self.rx.try_recv() {
            Ok(state) => Ok(Some(state)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(SmarterError::ConnectionClosed),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(SmarterError::Channel(format!("lagged by {} updates", n)))
            }
        }
    }
}
