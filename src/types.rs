use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Kind of appliance that answered a discovery probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceKind {
    Kettle,
    CoffeeMaker,
}

impl DeviceKind {
    /// Map the device-type byte of a probe reply
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x01 => Some(DeviceKind::Kettle),
            0x02 => Some(DeviceKind::CoffeeMaker),
            _ => None,
        }
    }

    /// Marketing name of the product line
    pub fn product_name(&self) -> &'static str {
        match self {
            DeviceKind::Kettle => "iKettle",
            DeviceKind::CoffeeMaker => "Smarter Coffee",
        }
    }

    /// Manufacturer name, for device-registry style consumers
    pub fn manufacturer(&self) -> &'static str {
        "Smarter"
    }
}

/// Network location of a discovered appliance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub address: String,
    pub port: u16,
}

/// Result of discovery: everything needed to open a control connection
///
/// `mac_address` is empty when ARP resolution failed; it is still the
/// preferred cross-session identity key when present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    pub kind: DeviceKind,
    pub firmware_version: u8,
    pub host: HostInfo,
    pub mac_address: String,
}

impl DeviceDescriptor {
    /// Connect to this device and return a ready [`CoffeeMaker`] facade
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
    ///     if let Some(descriptor) = devices.first() {
    ///         let maker = descriptor.connect(Duration::from_secs(10)).await?;
    ///         maker.set_cups(4).await?;
    ///     }
    ///     Ok(())
    /// }
    /// ```
    ///
    /// [`CoffeeMaker`]: crate::CoffeeMaker
    pub async fn connect(&self, timeout: Duration) -> crate::error::Result<crate::maker::CoffeeMaker> {
        let maker = crate::maker::CoffeeMaker::new(self.clone());
        maker.connect(timeout).await?;
        Ok(maker)
    }
}

/// What the appliance is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BrewState {
    Unknown,
    Ready,
    Brewing,
    Grinding,
    HeatingPlate,
}

/// Water reservoir level as reported by the status frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaterLevel {
    Empty,
    Low,
    Half,
    Full,
}

impl WaterLevel {
    /// Map the low nibble of the water-level byte
    pub fn from_nibble(nibble: u8) -> Option<Self> {
        match nibble {
            0x0 => Some(WaterLevel::Empty),
            0x1 => Some(WaterLevel::Low),
            0x2 => Some(WaterLevel::Half),
            0x3 => Some(WaterLevel::Full),
            _ => None,
        }
    }
}

/// Coffee strength setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Strength {
    Weak = 0x00,
    Medium = 0x01,
    Strong = 0x02,
}

impl Strength {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Strength::Weak),
            0x01 => Some(Strength::Medium),
            0x02 => Some(Strength::Strong),
            _ => None,
        }
    }

    pub fn as_byte(&self) -> u8 {
        *self as u8
    }
}

/// Device-reported result of a command
///
/// A rejected command is an outcome, not a client fault; check
/// [`CommandStatus::is_ok`] or match on the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CommandStatus {
    Ok,
    AlreadyBrewing,
    NoCarafe,
    NotEnoughWater,
    InvalidValue,
    NoWater,
    LowWater,
    TimerError,
    WifiError,
    InvalidCommand,
}

impl CommandStatus {
    /// Map a reply-table code; `None` for codes outside the table
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(CommandStatus::Ok),
            0x01 => Some(CommandStatus::AlreadyBrewing),
            // two firmware revisions use distinct codes for a missing carafe
            0x02 | 0x05 => Some(CommandStatus::NoCarafe),
            0x03 => Some(CommandStatus::NotEnoughWater),
            0x04 => Some(CommandStatus::InvalidValue),
            0x06 => Some(CommandStatus::NoWater),
            0x07 => Some(CommandStatus::LowWater),
            0x0D => Some(CommandStatus::TimerError),
            0x68 => Some(CommandStatus::WifiError),
            0x69 => Some(CommandStatus::InvalidCommand),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CommandStatus::Ok)
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CommandStatus::Ok => "ok",
            CommandStatus::AlreadyBrewing => "already brewing",
            CommandStatus::NoCarafe => "no carafe",
            CommandStatus::NotEnoughWater => "not enough water",
            CommandStatus::InvalidValue => "invalid value",
            CommandStatus::NoWater => "no water",
            CommandStatus::LowWater => "low water, could not finish",
            CommandStatus::TimerError => "timer error",
            CommandStatus::WifiError => "wifi error",
            CommandStatus::InvalidCommand => "invalid command",
        };
        f.write_str(text)
    }
}

/// Snapshot of appliance status
///
/// Owned and mutated by the connection's I/O paths; everyone else gets
/// clones via [`CoffeeMaker::state`] or the update subscription. Staleness
/// between clones is acceptable by design.
///
/// [`CoffeeMaker::state`]: crate::CoffeeMaker::state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    /// Whether the control connection is currently healthy
    pub available: bool,
    pub brew_state: BrewState,
    pub carafe_present: bool,
    pub hot_plate_on: bool,
    pub use_beans: bool,
    pub carafe_detection: bool,
    pub one_cup_mode: bool,
    pub water_level: WaterLevel,
    /// Separate nibble flag; does not strictly mirror `water_level`
    pub enough_water: bool,
    /// 1..=12
    pub cups: u8,
    pub strength: Strength,
    /// 0 = hot plate off
    pub hot_plate_minutes: u8,
    /// Informational only
    pub wifi_strength: u8,
}

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            available: true,
            brew_state: BrewState::Unknown,
            carafe_present: true,
            hot_plate_on: false,
            use_beans: true,
            carafe_detection: true,
            one_cup_mode: false,
            water_level: WaterLevel::Full,
            enough_water: true,
            cups: 3,
            strength: Strength::Strong,
            hot_plate_minutes: 5,
            wifi_strength: 3,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_kind_from_probe_codes() {
        assert_eq!(DeviceKind::from_code(0x01), Some(DeviceKind::Kettle));
        assert_eq!(DeviceKind::from_code(0x02), Some(DeviceKind::CoffeeMaker));
        assert_eq!(DeviceKind::from_code(0x03), None);
    }

    #[test]
    fn product_names() {
        assert_eq!(DeviceKind::CoffeeMaker.product_name(), "Smarter Coffee");
        assert_eq!(DeviceKind::Kettle.product_name(), "iKettle");
        assert_eq!(DeviceKind::Kettle.manufacturer(), "Smarter");
    }

    #[test]
    fn water_level_nibbles() {
        assert_eq!(WaterLevel::from_nibble(0x0), Some(WaterLevel::Empty));
        assert_eq!(WaterLevel::from_nibble(0x3), Some(WaterLevel::Full));
        assert_eq!(WaterLevel::from_nibble(0x7), None);
    }

    #[test]
    fn reply_table_round_trip() {
        assert_eq!(CommandStatus::from_code(0x00), Some(CommandStatus::Ok));
        assert_eq!(CommandStatus::from_code(0x01), Some(CommandStatus::AlreadyBrewing));
        assert_eq!(CommandStatus::from_code(0x02), Some(CommandStatus::NoCarafe));
        assert_eq!(CommandStatus::from_code(0x05), Some(CommandStatus::NoCarafe));
        assert_eq!(CommandStatus::from_code(0x69), Some(CommandStatus::InvalidCommand));
        assert_eq!(CommandStatus::from_code(0x42), None);
        assert!(CommandStatus::Ok.is_ok());
        assert!(!CommandStatus::NoCarafe.is_ok());
        assert_eq!(CommandStatus::NotEnoughWater.to_string(), "not enough water");
    }

    #[test]
    fn default_state_is_optimistic() {
        let state = DeviceState::default();
        assert!(state.available);
        assert_eq!(state.brew_state, BrewState::Unknown);
        assert_eq!(state.cups, 3);
        assert_eq!(state.strength, Strength::Strong);
    }
}
