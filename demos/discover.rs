//! Discover coffee makers on the local network, connect to the first one
//! and print state updates as they arrive.
//!
//! Run with: cargo run --example discover

use smarter_coffee::{Discovery, SmarterError};
use std::time::Duration;
use tokio::time::timeout;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    println!("Probing the local network for 15 seconds...");
    let devices = Discovery::new().find(Duration::from_secs(15)).await?;

    if devices.is_empty() {
        println!("No devices found.");
        return Ok(());
    }

    for device in &devices {
        println!(
            "Found {} (fw {}) at {}:{} [{}]",
            device.kind.product_name(),
            device.firmware_version,
            device.host.address,
            device.host.port,
            if device.mac_address.is_empty() {
                "mac unknown"
            } else {
                &device.mac_address
            }
        );
    }

    let maker = devices[0].connect(Duration::from_secs(10)).await?;
    println!(
        "Connected. Defaults: {} cups, {:?}, hot plate {} min",
        maker.state().cups,
        maker.state().strength,
        maker.state().hot_plate_minutes
    );

    maker.start_monitoring();
    let mut updates = maker.subscribe();

    println!("Watching state for 60 seconds (ctrl-c to quit)...");
    let watch = async {
        loop {
            match updates.recv().await {
                Ok(state) => println!(
                    "available={} state={:?} water={:?} cups={} strength={:?} hot_plate={}",
                    state.available,
                    state.brew_state,
                    state.water_level,
                    state.cups,
                    state.strength,
                    state.hot_plate_on,
                ),
                Err(SmarterError::Channel(msg)) => println!("({msg})"),
                Err(e) => {
                    println!("subscription ended: {e}");
                    break;
                }
            }
        }
    };
    let _ = timeout(Duration::from_secs(60), watch).await;

    maker.stop_monitoring().await;
    Ok(())
}
