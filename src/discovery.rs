use crate::error::Result;
use crate::types::{DeviceDescriptor, DeviceKind, HostInfo};
use regex::Regex;
use std::net::IpAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::process::Command;
use tokio::time::{interval, sleep_until, Instant};

/// Well-known discovery and control port
pub const DEFAULT_PORT: u16 = 2081;

const BROADCAST_ADDR: &str = "255.255.255.255";
const PROBE: [u8; 2] = [0x64, 0x7E];
const PROBE_REPLY: u8 = 0x65;
const BROADCAST_INTERVAL: Duration = Duration::from_secs(10);

/// Once a device answered, listen this much longer for stragglers instead
/// of waiting out the whole window
const LINGER_AFTER_FIRST: Duration = Duration::from_secs(1);

/// Discovery client for Smarter appliances on the local network
///
/// Broadcasts a UDP probe and collects replies for a caller-bounded window.
/// No responders within the window is an empty result, not an error.
///
/// # Example
///
/// ```no_run
/// use smarter_coffee::Discovery;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let devices = Discovery::new().find(Duration::from_secs(15)).await?;
///     for device in &devices {
///         println!(
///             "{} fw {} at {}:{}",
///             device.kind.product_name(),
///             device.firmware_version,
///             device.host.address,
///             device.host.port
///         );
///     }
///     Ok(())
/// }
/// ```
pub struct Discovery {
    broadcast_addr: String,
    port: u16,
}

impl Discovery {
    /// Discovery against the local broadcast address on the standard port
    pub fn new() -> Self {
        Self {
            broadcast_addr: BROADCAST_ADDR.to_string(),
            port: DEFAULT_PORT,
        }
    }

    /// Probe a specific address/port, for directed broadcast setups
    pub fn with_target(broadcast_addr: impl Into<String>, port: u16) -> Self {
        Self {
            broadcast_addr: broadcast_addr.into(),
            port,
        }
    }

    /// Run one discovery session bounded by `window`
    ///
    /// The probe repeats every 10 seconds while the window is open. Each
    /// reply is resolved to a hardware address (best effort) and
    /// de-duplicated within the session.
    pub async fn find(&self, window: Duration) -> Result<Vec<DeviceDescriptor>> {
        let socket = UdpSocket::bind(("0.0.0.0", 0)).await?;
        socket.set_broadcast(true)?;
        tracing::info!("discovery probing {}:{}", self.broadcast_addr, self.port);

        let mut probe_timer = interval(BROADCAST_INTERVAL);
        let mut close_at = Instant::now() + window;
        let mut found: Vec<DeviceDescriptor> = Vec::new();
        let mut buf = [0u8; 64];

        loop {
            tokio::select! {
                _ = probe_timer.tick() => {
                    socket
                        .send_to(&PROBE, (self.broadcast_addr.as_str(), self.port))
                        .await?;
                    tracing::debug!("probe sent");
                }
                _ = sleep_until(close_at) => break,
                received = socket.recv_from(&mut buf) => {
                    let (len, addr) = received?;
                    let data = &buf[..len];
                    tracing::debug!("received {:02x?} from {}", data, addr);

                    let Some((kind, firmware_version)) = parse_probe_reply(data) else {
                        tracing::debug!("not a probe reply, continuing");
                        continue;
                    };
                    let mac_address = lookup_mac(addr.ip()).await.unwrap_or_default();
                    let descriptor = DeviceDescriptor {
                        kind,
                        firmware_version,
                        host: HostInfo {
                            address: addr.ip().to_string(),
                            port: addr.port(),
                        },
                        mac_address,
                    };
                    if is_duplicate(&found, &descriptor) {
                        continue;
                    }
                    tracing::info!(
                        "found {} (fw {}) at {}",
                        kind.product_name(),
                        firmware_version,
                        descriptor.host.address
                    );
                    found.push(descriptor);
                    close_at = close_at.min(Instant::now() + LINGER_AFTER_FIRST);
                }
            }
        }

        Ok(found)
    }
}

impl Default for Discovery {
    fn default() -> Self {
        Self::new()
    }
}

/// Probe replies are `[0x65, deviceType, fwVersion, ...]`
fn parse_probe_reply(data: &[u8]) -> Option<(DeviceKind, u8)> {
    if data.len() < 3 || data[0] != PROBE_REPLY {
        return None;
    }
    let kind = DeviceKind::from_code(data[1])?;
    Some((kind, data[2]))
}

fn is_duplicate(found: &[DeviceDescriptor], candidate: &DeviceDescriptor) -> bool {
    found.iter().any(|existing| {
        if !candidate.mac_address.is_empty() && existing.mac_address == candidate.mac_address {
            return true;
        }
        existing.host.address == candidate.host.address
    })
}

/// Resolve the hardware address behind `ip` from the ARP table
///
/// Best effort: pings once so the neighbor table has a fresh entry, then
/// scrapes `arp -n`. Any failure yields `None` and discovery carries on.
async fn lookup_mac(ip: IpAddr) -> Option<String> {
    let target = ip.to_string();

    let ping = Command::new("ping")
        .args(["-c", "1", &target])
        .output()
        .await
        .ok()?;
    if !ping.status.success() {
        return None;
    }

    let arp = Command::new("arp").args(["-n", &target]).output().await.ok()?;
    let table = String::from_utf8_lossy(&arp.stdout);
    let pattern = Regex::new(r"([0-9a-f]{1,2}:){5}[0-9a-f]{1,2}").ok()?;
    pattern.find(&table).map(|m| m.as_str().to_string())
}
