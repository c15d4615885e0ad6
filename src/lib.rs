//! Rust library for discovering and controlling Smarter wifi coffee makers
//!
//! This library provides an async API for finding Smarter appliances on the
//! local network and driving them over their proprietary binary protocol.
//! It supports:
//!
//! - UDP broadcast discovery (coffee makers and iKettles answer)
//! - Persistent TCP control connection with automatic reconnect
//! - Brewing with explicit parameters or device defaults
//! - Cups, strength, grinder and hot plate control
//! - Carafe-detection and one-cup-mode configuration
//! - Continuous state monitoring with update subscriptions
//!
//! # Quick Start
//!
//! ```no_run
//! use smarter_coffee::{Discovery, Strength};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Probe the local network for appliances
//!     let devices = Discovery::new().find(Duration::from_secs(15)).await?;
//!
//!     if let Some(descriptor) = devices.first() {
//!         println!("Found {} at {}", descriptor.kind.product_name(), descriptor.host.address);
//!
//!         // Connect and control
//!         let maker = descriptor.connect(Duration::from_secs(10)).await?;
//!         let status = maker.brew(4, Strength::Medium, true, 10).await?;
//!         println!("brew: {}", status);
//!
//!         // Watch state changes
//!         maker.start_monitoring();
//!         let mut updates = maker.subscribe();
//!         while let Ok(state) = updates.recv().await {
//!             println!("state: {:?}", state.brew_state);
//!             break; // just show one update
//!         }
//!
//!         maker.stop_monitoring().await;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Direct Connection
//!
//! If you know the IP address of a device, skip discovery:
//!
//! ```no_run
//! use smarter_coffee::{CoffeeMaker, DeviceDescriptor, DeviceKind, HostInfo};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let descriptor = DeviceDescriptor {
//!         kind: DeviceKind::CoffeeMaker,
//!         firmware_version: 1,
//!         host: HostInfo { address: "192.168.1.88".into(), port: 2081 },
//!         mac_address: String::new(),
//!     };
//!     let maker = CoffeeMaker::new(descriptor);
//!     maker.connect(Duration::from_secs(10)).await?;
//!     maker.set_cups(4).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Discovery**: UDP broadcast probe on port 2081
//! - **CoffeeMaker**: typed control facade and monitor lifecycle
//! - **Connection**: TCP socket, single-flight command serialization,
//!   cached state
//! - **Monitor**: background read loop with reconnect and capped backoff
//! - **Protocol**: binary frame encoding/decoding
//! - **Types**: domain types and data structures
//!
//! The wire protocol is half-duplex with no request ids: replies correlate
//! to commands purely by position, which is why all socket access is
//! serialized behind one lock.

mod connection;
mod discovery;
mod error;
mod maker;
mod monitor;
mod protocol;
mod subscription;
mod types;

// Public exports
pub use discovery::{Discovery, DEFAULT_PORT};
pub use error::{Result, SmarterError};
pub use maker::CoffeeMaker;
pub use protocol::CarafePolarity;
pub use subscription::StateReceiver;
pub use types::{
    BrewState, CommandStatus, DeviceDescriptor, DeviceKind, DeviceState, HostInfo, Strength,
    WaterLevel,
};
