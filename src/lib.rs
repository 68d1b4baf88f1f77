//! # Stage Controller Simulator Library
//!
//! This library simulates the firmware of a multi-axis motorized stage and illumination
//! controller. It accepts the same ASCII commands as the real device and answers with
//! byte-identical responses, so acquisition code can be exercised without hardware.
//!
//! Motion is instantaneous: every command is applied in full before its reply is returned.
//!
//! ```
//! use stage_sim::Simulator;
//!
//! let mut sim = Simulator::new();
//! assert_eq!(sim.send_command("o1A1000 2X200o"), "");
//! assert_eq!(sim.send_command("g1A 2Xg"), "1A:1000 2X:200\n");
//! assert_eq!(sim.send_command("foobar"), "Unrecognized command format\n");
//! ```

pub mod command;
pub mod config;
pub mod port;
pub mod state;

use tracing::{debug, warn};

pub use command::{Command, CommandError, ModePresets};
pub use config::SimulatorConfig;
pub use port::SimulatedPort;
pub use state::{ActuatorState, AxisTable, DeviceState};

/// Reply the firmware gives to anything it cannot parse.
///
/// Also returned for well-formed moves and mode macros whose result would not fit in an `i64`
/// position (see [`CommandError::PositionOverflow`]). The firmware has no such limit, so this is
/// the one case where the simulator rejects a command the real controller accepts.
pub const UNRECOGNIZED_RESPONSE: &str = "Unrecognized command format\n";

// The simulated controller: its state plus the fixed mode-macro presets.
#[derive(Debug, Default, Clone)]
pub struct Simulator {
    // Open to test harnesses for presetting and asserting state.
    pub state: DeviceState,
    presets: ModePresets,
}

impl Simulator {
    /// Creates a simulator in its power-on state with the reference mode presets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a simulator whose mode macros act on a different axis or distance.
    pub fn with_presets(presets: ModePresets) -> Self {
        Self {
            state: DeviceState::default(),
            presets,
        }
    }

    /// Creates a simulator from a loaded configuration.
    pub fn from_config(config: &SimulatorConfig) -> Self {
        let mut simulator = Self::with_presets(ModePresets::from(&config.presets));
        simulator.set_photodiode(config.sensors.photodiode);
        simulator
    }

    pub fn presets(&self) -> &ModePresets {
        &self.presets
    }

    /// Injects the value reported by the next photodiode read.
    pub fn set_photodiode(&mut self, value: i64) {
        self.state.actuators.photodiode = value;
    }

    /// Returns to the power-on state. Presets are kept.
    pub fn reset(&mut self) {
        self.state = DeviceState::default();
    }

    /// Classifies and executes one command, reporting why it was rejected if it was.
    pub fn process_command(&mut self, command_str: &str) -> Result<String, CommandError> {
        let command = Command::parse(command_str)?;
        debug!(?command, "dispatching");
        command.execute(&mut self.state, &self.presets)
    }

    /// Executes one command and returns exactly what the firmware would send back.
    ///
    /// Never fails: rejected commands leave the state untouched and produce
    /// [`UNRECOGNIZED_RESPONSE`].
    pub fn send_command(&mut self, command_str: &str) -> String {
        match self.process_command(command_str) {
            Ok(response) => response,
            Err(e) => {
                warn!(command = %command_str.escape_default(), reason = %e, "unrecognized command");
                String::from(UNRECOGNIZED_RESPONSE)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Tests for construction and harness access ---

    #[test]
    fn simulator_creation() {
        let sim = Simulator::new();
        assert!(sim.state.axes.is_empty());
        assert_eq!(sim.presets().offset, 6000);
    }

    #[test]
    fn from_config_applies_presets_and_sensor() {
        let mut config = SimulatorConfig::default();
        config.presets.module = '1';
        config.presets.axis = 'Z';
        config.presets.offset = 100;
        config.sensors.photodiode = 77;
        let mut sim = Simulator::from_config(&config);
        assert_eq!(sim.send_command("m ld0 m"), "t77\n");
        sim.send_command("ramanmode");
        assert_eq!(sim.state.axes.position('1', 'Z'), 100);
    }

    #[test]
    fn reset_keeps_presets() {
        let mut sim = Simulator::with_presets(ModePresets {
            target: command::AxisRef::new('5', 'B'),
            offset: 3,
        });
        sim.send_command("s1A9s");
        sim.send_command("m gsh on m");
        sim.reset();
        assert_eq!(sim.state, DeviceState::default());
        sim.send_command("imagemode");
        assert_eq!(sim.state.axes.position('5', 'B'), -3);
    }

    // --- Tests for dispatch ---

    #[test]
    fn process_command_reports_reason() {
        let mut sim = Simulator::new();
        assert_eq!(
            sim.process_command("o1A100"),
            Err(CommandError::MissingSentinel('o'))
        );
    }

    #[test]
    fn send_command_ignores_line_terminators() {
        let mut sim = Simulator::new();
        assert_eq!(sim.send_command("ramanmode\r\n"), "Moving to Raman Mode...\n");
        assert_eq!(sim.send_command("  g2Ag\n"), "2A:6000\n");
    }

    #[test]
    fn get_position_creates_entries() {
        let mut sim = Simulator::new();
        assert_eq!(sim.send_command("g3Cg"), "3C:0\n");
        assert!(sim.state.axes.contains('3', 'C'));
    }

    #[test]
    fn check_moving_reports_false_for_each_axis() {
        let mut sim = Simulator::new();
        sim.send_command("o1A50o");
        assert_eq!(sim.send_command("c1A 2Bc"), "1A:false 2B:false\n");
    }

    #[test]
    fn set_position_echoes_signed_value() {
        let mut sim = Simulator::new();
        assert_eq!(sim.send_command("s1X+15s"), "Set motor 1X position to 15\n");
        assert_eq!(sim.state.axes.position('1', 'X'), 15);
    }

    #[test]
    fn led_commands_drive_both_channels() {
        let mut sim = Simulator::new();
        assert_eq!(sim.send_command("m led on m"), "LED on\n");
        assert!(sim.state.actuators.led1_on && sim.state.actuators.led2_on);
        assert_eq!(sim.send_command("m led off m"), "LED off\n");
        assert!(!sim.state.actuators.led1_on && !sim.state.actuators.led2_on);
    }

    #[test]
    fn shutter_state_follows_explicit_argument() {
        let mut sim = Simulator::new();
        assert_eq!(sim.send_command("m gsh on m"), "Shutter open.\n");
        assert_eq!(sim.send_command("m gsh on m"), "Shutter open.\n");
        assert!(sim.state.actuators.shutter_open);
        assert_eq!(sim.send_command("m gsh off m"), "Shutter closed.\n");
        assert!(!sim.state.actuators.shutter_open);
    }

    #[test]
    fn unknown_actuator_body_is_unrecognized() {
        let mut sim = Simulator::new();
        assert_eq!(sim.send_command("m laser on m"), UNRECOGNIZED_RESPONSE);
        assert_eq!(sim.state.actuators, ActuatorState::default());
    }

    #[test]
    fn malformed_move_changes_nothing() {
        let mut sim = Simulator::new();
        sim.state.axes.set('1', 'A', 10);
        let before = sim.state.clone();
        assert_eq!(sim.send_command("o1A5 1Bxo"), UNRECOGNIZED_RESPONSE);
        assert_eq!(sim.state, before);
    }

    #[test]
    fn overflowing_move_is_unrecognized() {
        let mut sim = Simulator::new();
        sim.state.axes.set('3', 'X', i64::MIN + 5);
        assert_eq!(sim.send_command("o3X-6o"), UNRECOGNIZED_RESPONSE);
        assert_eq!(sim.state.axes.position('3', 'X'), i64::MIN + 5);
        assert_eq!(sim.send_command("o3X-5o"), "");
        assert_eq!(sim.state.axes.position('3', 'X'), i64::MIN);
    }

    #[test]
    fn overflowing_macro_is_unrecognized() {
        let mut sim = Simulator::new();
        sim.state.axes.set('2', 'A', i64::MAX);
        assert_eq!(sim.send_command("ramanmode"), UNRECOGNIZED_RESPONSE);
        assert_eq!(sim.state.axes.position('2', 'A'), i64::MAX);
    }
}
