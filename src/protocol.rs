//! Binary wire protocol for Smarter appliances
//!
//! Commands are a single id byte, zero or more parameter bytes and a
//! trailing suffix byte. Responses are dispatched on their leading byte and
//! carry the same suffix, so a single socket read may contain several
//! concatenated frames or a partial one; callers split on the suffix before
//! decoding. This module is pure, no I/O.

use crate::error::{Result, SmarterError};
use crate::types::{BrewState, CommandStatus, DeviceState, Strength, WaterLevel};

/// Every frame in either direction ends with this byte
pub(crate) const FRAME_SUFFIX: u8 = 0x7E;

// Command ids (client -> device)
pub(crate) const CMD_BREW: u8 = 0x33;
pub(crate) const CMD_BREW_STOP: u8 = 0x34;
pub(crate) const CMD_SET_STRENGTH: u8 = 0x35;
pub(crate) const CMD_SET_CUPS: u8 = 0x36;
pub(crate) const CMD_BREW_DEFAULT: u8 = 0x37;
pub(crate) const CMD_TOGGLE_BEANS: u8 = 0x3C;
pub(crate) const CMD_HOT_PLATE_ON: u8 = 0x3E;
pub(crate) const CMD_GET_DEFAULTS: u8 = 0x48;
pub(crate) const CMD_HOT_PLATE_OFF: u8 = 0x4A;
pub(crate) const CMD_SET_CARAFE_DETECTION: u8 = 0x4B;
pub(crate) const CMD_GET_CARAFE_DETECTION: u8 = 0x4C;
pub(crate) const CMD_SET_ONE_CUP_MODE: u8 = 0x4E;
pub(crate) const CMD_GET_ONE_CUP_MODE: u8 = 0x4F;

// Response ids (device -> client)
pub(crate) const RESP_COMMAND_ACK: u8 = 0x03;
pub(crate) const RESP_STATUS: u8 = 0x32;
pub(crate) const RESP_CARAFE: u8 = 0x4D;
pub(crate) const RESP_DEFAULTS: u8 = 0x49;
pub(crate) const RESP_ONE_CUP_MODE: u8 = 0x50;

/// Direction of the carafe-detection flag
///
/// Two observed firmware revisions disagree on whether `0x01` means the
/// detection is on or off; the flag direction applies symmetrically to the
/// set command and the 0x4D reply. Which revision current hardware ships is
/// not settled; pick explicitly rather than trusting the default blindly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CarafePolarity {
    /// Flag `0x00` enables detection (latest observed revision)
    #[default]
    ZeroEnables,
    /// Flag `0x01` enables detection (older revision)
    OneEnables,
}

impl CarafePolarity {
    pub(crate) fn encode(&self, enabled: bool) -> u8 {
        match self {
            CarafePolarity::ZeroEnables => u8::from(!enabled),
            CarafePolarity::OneEnables => u8::from(enabled),
        }
    }

    pub(crate) fn decode(&self, flag: u8) -> bool {
        match self {
            CarafePolarity::ZeroEnables => flag == 0,
            CarafePolarity::OneEnables => flag != 0,
        }
    }
}

/// Build a parameterless command frame
pub(crate) fn command(id: u8) -> Vec<u8> {
    vec![id, FRAME_SUFFIX]
}

/// Build a single-parameter command frame
pub(crate) fn command_with_value(id: u8, value: u8) -> Vec<u8> {
    vec![id, value, FRAME_SUFFIX]
}

/// Build the full brew command: cups, strength, hot plate minutes, grinder
pub(crate) fn brew_command(cups: u8, strength: Strength, hot_plate_minutes: u8, grind: bool) -> Vec<u8> {
    vec![
        CMD_BREW,
        cups,
        strength.as_byte(),
        hot_plate_minutes,
        u8::from(grind),
        FRAME_SUFFIX,
    ]
}

/// Out-of-range values fall back to the default; never an error
pub(crate) fn clamp_or_default(value: u8, min: u8, max: u8, default: u8) -> u8 {
    if value >= min && value <= max {
        value
    } else {
        default
    }
}

/// Split a raw read into individual suffix-delimited frames
///
/// Empty fragments (leading suffix, back-to-back suffixes, trailing
/// partial) are dropped.
pub(crate) fn split_frames(buf: &[u8]) -> impl Iterator<Item = &[u8]> {
    buf.split(|b| *b == FRAME_SUFFIX).filter(|frame| !frame.is_empty())
}

/// One decoded device frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Frame {
    Status(StatusFrame),
    CommandAck(CommandStatus),
    CarafeDetection(bool),
    OneCupMode(bool),
    Defaults(DefaultsFrame),
}

/// Decoded unsolicited status push
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusFrame {
    pub carafe_present: bool,
    pub use_beans: bool,
    pub hot_plate_on: bool,
    /// `None` when no state bit is set; the cached value stays as-is
    pub brew_state: Option<BrewState>,
    pub water_level: WaterLevel,
    pub enough_water: bool,
    pub wifi_strength: u8,
    pub strength: Strength,
    pub cups: u8,
}

impl StatusFrame {
    pub(crate) fn apply_to(&self, state: &mut DeviceState) {
        state.carafe_present = self.carafe_present;
        state.use_beans = self.use_beans;
        state.hot_plate_on = self.hot_plate_on;
        if let Some(brew_state) = self.brew_state {
            state.brew_state = brew_state;
        }
        state.water_level = self.water_level;
        state.enough_water = self.enough_water;
        state.wifi_strength = self.wifi_strength;
        state.strength = self.strength;
        state.cups = self.cups;
    }
}

/// Device defaults, read once after connect to seed cached state
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DefaultsFrame {
    pub cups: u8,
    pub strength: Strength,
    pub use_beans: bool,
    pub hot_plate_minutes: u8,
}

impl DefaultsFrame {
    pub(crate) fn apply_to(&self, state: &mut DeviceState) {
        state.cups = self.cups;
        state.strength = self.strength;
        state.use_beans = self.use_beans;
        state.hot_plate_minutes = self.hot_plate_minutes;
    }
}

/// Decode one suffix-stripped frame
pub(crate) fn decode_frame(frame: &[u8], polarity: CarafePolarity) -> Result<Frame> {
    let id = *frame
        .first()
        .ok_or_else(|| SmarterError::Protocol("empty frame".into()))?;

    match id {
        RESP_STATUS => decode_status(frame).map(Frame::Status),
        RESP_COMMAND_ACK => {
            let code = payload_byte(frame)?;
            CommandStatus::from_code(code)
                .map(Frame::CommandAck)
                .ok_or(SmarterError::UnknownReply(code))
        }
        RESP_CARAFE => Ok(Frame::CarafeDetection(polarity.decode(payload_byte(frame)?))),
        RESP_ONE_CUP_MODE => Ok(Frame::OneCupMode(payload_byte(frame)? != 0)),
        RESP_DEFAULTS => decode_defaults(frame).map(Frame::Defaults),
        other => Err(SmarterError::Protocol(format!(
            "unknown response id {other:#04x}"
        ))),
    }
}

fn payload_byte(frame: &[u8]) -> Result<u8> {
    frame
        .get(1)
        .copied()
        .ok_or_else(|| SmarterError::Protocol("frame too short".into()))
}

fn decode_status(frame: &[u8]) -> Result<StatusFrame> {
    if frame.len() < 6 {
        return Err(SmarterError::Protocol(format!(
            "status frame too short: {} bytes",
            frame.len()
        )));
    }

    let status = frame[1];
    let water = frame[2];
    let wifi_strength = frame[3];
    let strength = frame[4];
    let cups = frame[5];

    let is_set = |bit: u8| status & (1 << bit) != 0;

    let carafe_present = is_set(0);
    let use_beans = is_set(1);
    let ready = is_set(2);
    let grinder_on = is_set(3);
    let heater_on = is_set(4);
    // set once the hot plate turns off after a heating cycle
    let ready_hot_plate = is_set(5);
    let hot_plate_on = is_set(6);
    // bit 7 is a timer event; unused

    // later checks override earlier ones, matching observed firmware
    let mut brew_state = None;
    if ready || ready_hot_plate {
        brew_state = Some(BrewState::Ready);
    }
    if hot_plate_on {
        brew_state = Some(BrewState::HeatingPlate);
    }
    if heater_on {
        brew_state = Some(BrewState::Brewing);
    }
    if grinder_on {
        brew_state = Some(BrewState::Grinding);
    }

    // high nibble is a separate enough-water flag
    let (water_level, enough_water) = match WaterLevel::from_nibble(water % 16) {
        Some(level) => (level, water / 16 >= 1),
        None => (WaterLevel::Empty, false),
    };

    Ok(StatusFrame {
        carafe_present,
        use_beans,
        hot_plate_on,
        brew_state,
        water_level,
        enough_water,
        wifi_strength,
        strength: Strength::from_byte(strength).unwrap_or(Strength::Strong),
        cups: cups % 16,
    })
}

fn decode_defaults(frame: &[u8]) -> Result<DefaultsFrame> {
    if frame.len() < 5 {
        return Err(SmarterError::Protocol(format!(
            "defaults frame too short: {} bytes",
            frame.len()
        )));
    }

    Ok(DefaultsFrame {
        cups: frame[1],
        strength: Strength::from_byte(frame[2]).unwrap_or(Strength::Strong),
        use_beans: frame[3] != 0,
        hot_plate_minutes: frame[4],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_frames() {
        assert_eq!(command(CMD_BREW_STOP), vec![0x34, 0x7E]);
        assert_eq!(command_with_value(CMD_SET_CUPS, 4), vec![0x36, 0x04, 0x7E]);
        assert_eq!(
            brew_command(4, Strength::Medium, 10, true),
            vec![0x33, 0x04, 0x01, 0x0A, 0x01, 0x7E]
        );
        assert_eq!(
            brew_command(12, Strength::Weak, 0, false),
            vec![0x33, 0x0C, 0x00, 0x00, 0x00, 0x7E]
        );
    }

    #[test]
    fn clamping_falls_back_to_defaults() {
        assert_eq!(clamp_or_default(0, 1, 12, 3), 3);
        assert_eq!(clamp_or_default(13, 1, 12, 3), 3);
        assert_eq!(clamp_or_default(12, 1, 12, 3), 12);
        assert_eq!(clamp_or_default(3, 5, 40, 5), 5);
        assert_eq!(clamp_or_default(41, 5, 40, 5), 5);
        assert_eq!(clamp_or_default(40, 5, 40, 5), 40);
    }

    #[test]
    fn status_decode() {
        // 0x0B = carafe present + use beans + ready
        let frame = [0x32, 0x0B, 0x03, 0x03, 0x02, 0x03];
        let decoded = match decode_frame(&frame, CarafePolarity::default()).unwrap() {
            Frame::Status(status) => status,
            other => panic!("expected status frame, got {other:?}"),
        };
        assert!(decoded.carafe_present);
        assert!(decoded.use_beans);
        assert_eq!(decoded.brew_state, Some(BrewState::Ready));
        assert_eq!(decoded.water_level, WaterLevel::Full);
        // 0x03 / 16 == 0: the enough-water nibble is not set
        assert!(!decoded.enough_water);
        assert_eq!(decoded.wifi_strength, 3);
        assert_eq!(decoded.strength, Strength::Strong);
        assert_eq!(decoded.cups, 3);
    }

    #[test]
    fn status_state_priority() {
        // grinder beats heater beats hot plate beats ready
        let frame = [0x32, 0b0111_1100, 0x13, 0x03, 0x01, 0x04];
        let decoded = match decode_frame(&frame, CarafePolarity::default()).unwrap() {
            Frame::Status(status) => status,
            other => panic!("expected status frame, got {other:?}"),
        };
        assert_eq!(decoded.brew_state, Some(BrewState::Grinding));
        assert!(decoded.hot_plate_on);
        assert!(decoded.enough_water);
        assert_eq!(decoded.water_level, WaterLevel::Full);
    }

    #[test]
    fn status_without_state_bits_leaves_brew_state_alone() {
        let frame = [0x32, 0b0000_0011, 0x13, 0x03, 0x01, 0x04];
        let decoded = match decode_frame(&frame, CarafePolarity::default()).unwrap() {
            Frame::Status(status) => status,
            other => panic!("expected status frame, got {other:?}"),
        };
        assert_eq!(decoded.brew_state, None);

        let mut state = DeviceState::default();
        state.brew_state = BrewState::Brewing;
        decoded.apply_to(&mut state);
        assert_eq!(state.brew_state, BrewState::Brewing);
        assert_eq!(state.strength, Strength::Medium);
        assert_eq!(state.cups, 4);
    }

    #[test]
    fn status_with_bad_water_nibble() {
        let frame = [0x32, 0x04, 0x17, 0x03, 0x09, 0x24];
        let decoded = match decode_frame(&frame, CarafePolarity::default()).unwrap() {
            Frame::Status(status) => status,
            other => panic!("expected status frame, got {other:?}"),
        };
        assert_eq!(decoded.water_level, WaterLevel::Empty);
        assert!(!decoded.enough_water);
        // unrecognized strength byte defaults to strong, cups wrap at 16
        assert_eq!(decoded.strength, Strength::Strong);
        assert_eq!(decoded.cups, 4);
    }

    #[test]
    fn ack_decode() {
        assert_eq!(
            decode_frame(&[0x03, 0x00], CarafePolarity::default()).unwrap(),
            Frame::CommandAck(CommandStatus::Ok)
        );
        assert_eq!(
            decode_frame(&[0x03, 0x03], CarafePolarity::default()).unwrap(),
            Frame::CommandAck(CommandStatus::NotEnoughWater)
        );
        match decode_frame(&[0x03, 0x42], CarafePolarity::default()) {
            Err(SmarterError::UnknownReply(0x42)) => {}
            other => panic!("expected unknown reply error, got {other:?}"),
        }
    }

    #[test]
    fn carafe_polarity_revisions() {
        assert_eq!(
            decode_frame(&[0x4D, 0x00], CarafePolarity::ZeroEnables).unwrap(),
            Frame::CarafeDetection(true)
        );
        assert_eq!(
            decode_frame(&[0x4D, 0x01], CarafePolarity::ZeroEnables).unwrap(),
            Frame::CarafeDetection(false)
        );
        assert_eq!(
            decode_frame(&[0x4D, 0x01], CarafePolarity::OneEnables).unwrap(),
            Frame::CarafeDetection(true)
        );

        assert_eq!(CarafePolarity::ZeroEnables.encode(true), 0x00);
        assert_eq!(CarafePolarity::ZeroEnables.encode(false), 0x01);
        assert_eq!(CarafePolarity::OneEnables.encode(true), 0x01);
    }

    #[test]
    fn one_cup_mode_decode() {
        assert_eq!(
            decode_frame(&[0x50, 0x01], CarafePolarity::default()).unwrap(),
            Frame::OneCupMode(true)
        );
        assert_eq!(
            decode_frame(&[0x50, 0x00], CarafePolarity::default()).unwrap(),
            Frame::OneCupMode(false)
        );
    }

    #[test]
    fn defaults_decode_and_apply() {
        let decoded = match decode_frame(&[0x49, 0x04, 0x01, 0x01, 0x0A], CarafePolarity::default()) {
            Ok(Frame::Defaults(defaults)) => defaults,
            other => panic!("expected defaults frame, got {other:?}"),
        };
        assert_eq!(decoded.cups, 4);
        assert_eq!(decoded.strength, Strength::Medium);
        assert!(decoded.use_beans);
        assert_eq!(decoded.hot_plate_minutes, 10);

        let mut state = DeviceState::default();
        decoded.apply_to(&mut state);
        assert_eq!(state.cups, 4);
        assert_eq!(state.hot_plate_minutes, 10);
    }

    #[test]
    fn split_concatenated_frames() {
        // a command ack followed by a status push in one raw read
        let raw = [0x03, 0x00, 0x7E, 0x32, 0x0B, 0x03, 0x03, 0x02, 0x03, 0x7E];
        let frames: Vec<&[u8]> = split_frames(&raw).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(
            decode_frame(frames[0], CarafePolarity::default()).unwrap(),
            Frame::CommandAck(CommandStatus::Ok)
        );
        assert!(matches!(
            decode_frame(frames[1], CarafePolarity::default()).unwrap(),
            Frame::Status(_)
        ));
    }

    #[test]
    fn split_drops_empty_fragments() {
        let raw = [0x7E, 0x7E, 0x03, 0x00, 0x7E];
        let frames: Vec<&[u8]> = split_frames(&raw).collect();
        assert_eq!(frames, vec![&[0x03, 0x00][..]]);
    }

    #[test]
    fn malformed_frames_error() {
        assert!(decode_frame(&[], CarafePolarity::default()).is_err());
        assert!(decode_frame(&[0x32, 0x01], CarafePolarity::default()).is_err());
        assert!(decode_frame(&[0x49, 0x01], CarafePolarity::default()).is_err());
        assert!(decode_frame(&[0xAB, 0x01], CarafePolarity::default()).is_err());
    }
}
