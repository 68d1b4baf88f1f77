//! Command classification and execution.
//!
//! The wire protocol uses single-letter family tags. Most families bracket their body with the
//! tag itself (`o1A100 2X-5o`), home commands use the tag as a bare prefix (`h2Y`), and the two
//! mode macros are fixed words. Parsing is purely syntactic: any single character is accepted
//! as a module or axis identifier.

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use thiserror::Error;

use crate::state::DeviceState;

/// Literal that switches the optical path to the spectrometer.
pub const RAMAN_MODE: &str = "ramanmode";
/// Literal that switches the optical path to the camera.
pub const IMAGE_MODE: &str = "imagemode";

/// Module moved by the mode macros on the reference hardware.
pub const PRESET_MODULE: char = '2';
/// Axis moved by the mode macros on the reference hardware.
pub const PRESET_AXIS: char = 'A';
/// Distance in steps between the imaging and Raman positions.
pub const PRESET_OFFSET_STEPS: i64 = 6000;

/// Reasons a command string is not accepted.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty command")]
    Empty,
    #[error("unknown command family")]
    UnknownFamily,
    /// The body is not closed by the family tag.
    #[error("command is not enclosed in '{0}' sentinels")]
    MissingSentinel(char),
    #[error("'{0}' command has no operands")]
    EmptyBody(char),
    /// A token does not start with exactly one module and one axis character.
    #[error("malformed axis address `{0}`")]
    MalformedAxis(String),
    #[error("invalid numeric operand in `{token}`")]
    InvalidOperand {
        token: String,
        #[source]
        source: ParseIntError,
    },
    #[error("'{family}' command takes {expected} operand(s), got {found}")]
    WrongOperandCount {
        family: char,
        expected: usize,
        found: usize,
    },
    #[error("unknown actuator command `{0}`")]
    UnknownActuator(String),
    /// Applying the command would leave a position outside the `i64` range.
    ///
    /// Positions are stored as `i64`, while the controller firmware keeps unbounded integers.
    /// A well-formed move or mode macro that would overflow is therefore rejected here (and
    /// answered with the unrecognized-command reply) where the firmware would accept it.
    #[error("position of axis {0} would overflow")]
    PositionOverflow(AxisRef),
}

/// One addressable axis: a module identifier followed by an axis identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AxisRef {
    pub module: char,
    pub axis: char,
}

impl AxisRef {
    pub fn new(module: char, axis: char) -> Self {
        Self { module, axis }
    }

    fn parse(token: &str) -> Result<Self, CommandError> {
        let mut chars = token.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(module), Some(axis), None) => Ok(Self { module, axis }),
            _ => Err(CommandError::MalformedAxis(token.to_string())),
        }
    }
}

impl fmt::Display for AxisRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.module, self.axis)
    }
}

/// An axis address with a signed step count, used by both relative and absolute moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOp {
    pub target: AxisRef,
    pub steps: i64,
}

impl MoveOp {
    fn parse(token: &str) -> Result<Self, CommandError> {
        let mut chars = token.chars();
        let (Some(module), Some(axis)) = (chars.next(), chars.next()) else {
            return Err(CommandError::MalformedAxis(token.to_string()));
        };
        let steps = chars
            .as_str()
            .parse::<i64>()
            .map_err(|source| CommandError::InvalidOperand {
                token: token.to_string(),
                source,
            })?;
        Ok(Self {
            target: AxisRef { module, axis },
            steps,
        })
    }
}

/// Bodies understood inside an `m ... m` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActuatorOp {
    ShutterOpen,
    ShutterClose,
    LedOn,
    LedOff,
    ReadPhotodiode,
}

impl ActuatorOp {
    fn parse(body: &str) -> Result<Self, CommandError> {
        match body {
            "gsh on" => Ok(Self::ShutterOpen),
            "gsh off" => Ok(Self::ShutterClose),
            "led on" => Ok(Self::LedOn),
            "led off" => Ok(Self::LedOff),
            "ld0" => Ok(Self::ReadPhotodiode),
            other => Err(CommandError::UnknownActuator(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeMacro {
    Raman,
    Image,
}

/// The axis and distance the mode macros act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModePresets {
    pub target: AxisRef,
    pub offset: i64,
}

impl Default for ModePresets {
    fn default() -> Self {
        Self {
            target: AxisRef::new(PRESET_MODULE, PRESET_AXIS),
            offset: PRESET_OFFSET_STEPS,
        }
    }
}

/// A classified command with its operands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Relative move of one or more axes.
    Move(Vec<MoveOp>),
    GetPosition(Vec<AxisRef>),
    CheckMoving(Vec<AxisRef>),
    /// Absolute position overwrite of one axis.
    SetPosition(MoveOp),
    Home(AxisRef),
    Actuator(ActuatorOp),
    ModeMacro(ModeMacro),
}

impl Command {
    /// Classifies a raw command string. Surrounding whitespace is ignored.
    pub fn parse(raw: &str) -> Result<Self, CommandError> {
        let raw = raw.trim();
        match raw {
            RAMAN_MODE => return Ok(Self::ModeMacro(ModeMacro::Raman)),
            IMAGE_MODE => return Ok(Self::ModeMacro(ModeMacro::Image)),
            _ => {}
        }

        let tag = raw.chars().next().ok_or(CommandError::Empty)?;
        match tag {
            'o' => parse_all(framed_body(raw, tag)?, tag, MoveOp::parse).map(Self::Move),
            'g' => parse_all(framed_body(raw, tag)?, tag, AxisRef::parse).map(Self::GetPosition),
            'c' => parse_all(framed_body(raw, tag)?, tag, AxisRef::parse).map(Self::CheckMoving),
            's' => parse_one(framed_body(raw, tag)?, tag, MoveOp::parse).map(Self::SetPosition),
            'h' => parse_one(&raw[tag.len_utf8()..], tag, AxisRef::parse).map(Self::Home),
            'm' => ActuatorOp::parse(framed_body(raw, tag)?.trim()).map(Self::Actuator),
            _ => Err(CommandError::UnknownFamily),
        }
    }

    /// Applies the command to `state` and renders the firmware's reply.
    ///
    /// Either every mutation is applied or none is: moves are staged on a copy of the axis
    /// table and only committed once all of them fit in range.
    pub fn execute(
        self,
        state: &mut DeviceState,
        presets: &ModePresets,
    ) -> Result<String, CommandError> {
        match self {
            Self::Move(ops) => {
                let mut staged = state.axes.clone();
                for op in &ops {
                    let position = staged.position_mut(op.target.module, op.target.axis);
                    let current = *position;
                    *position = current
                        .checked_add(op.steps)
                        .ok_or(CommandError::PositionOverflow(op.target))?;
                }
                state.axes = staged;
                // Motion commands are not acknowledged by the firmware.
                Ok(String::new())
            }
            Self::GetPosition(targets) => {
                let readings: Vec<String> = targets
                    .iter()
                    .map(|t| format!("{}:{}", t, state.axes.position_mut(t.module, t.axis)))
                    .collect();
                Ok(format!("{}\n", readings.join(" ")))
            }
            Self::CheckMoving(targets) => {
                let readings: Vec<String> = targets.iter().map(|t| format!("{t}:false")).collect();
                Ok(format!("{}\n", readings.join(" ")))
            }
            Self::SetPosition(op) => {
                state.axes.set(op.target.module, op.target.axis, op.steps);
                Ok(format!("Set motor {} position to {}\n", op.target, op.steps))
            }
            Self::Home(target) => {
                state.axes.home(target.module, target.axis);
                Ok(format!("Homed motor {target} at position 0\n"))
            }
            Self::Actuator(op) => Ok(run_actuator(op, state)),
            Self::ModeMacro(mode) => {
                let (delta, reply) = match mode {
                    ModeMacro::Raman => (Some(presets.offset), "Moving to Raman Mode...\n"),
                    ModeMacro::Image => (presets.offset.checked_neg(), "Moving to Image Mode...\n"),
                };
                let target = presets.target;
                let moved = delta
                    .and_then(|d| state.axes.position(target.module, target.axis).checked_add(d))
                    .ok_or(CommandError::PositionOverflow(target))?;
                state.axes.set(target.module, target.axis, moved);
                Ok(reply.to_string())
            }
        }
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn run_actuator(op: ActuatorOp, state: &mut DeviceState) -> String {
    let actuators = &mut state.actuators;
    match op {
        ActuatorOp::ShutterOpen => {
            actuators.shutter_open = true;
            String::from("Shutter open.\n")
        }
        ActuatorOp::ShutterClose => {
            actuators.shutter_open = false;
            String::from("Shutter closed.\n")
        }
        ActuatorOp::LedOn => {
            actuators.set_leds(true);
            String::from("LED on\n")
        }
        ActuatorOp::LedOff => {
            actuators.set_leds(false);
            String::from("LED off\n")
        }
        ActuatorOp::ReadPhotodiode => format!("t{}\n", actuators.photodiode),
    }
}

/// Strips the opening and closing sentinel. Needs at least two characters.
fn framed_body(raw: &str, tag: char) -> Result<&str, CommandError> {
    raw.strip_prefix(tag)
        .and_then(|rest| rest.strip_suffix(tag))
        .ok_or(CommandError::MissingSentinel(tag))
}

fn parse_all<T>(
    body: &str,
    family: char,
    parse: fn(&str) -> Result<T, CommandError>,
) -> Result<Vec<T>, CommandError> {
    let operands = body
        .split_ascii_whitespace()
        .map(parse)
        .collect::<Result<Vec<_>, _>>()?;
    if operands.is_empty() {
        return Err(CommandError::EmptyBody(family));
    }
    Ok(operands)
}

fn parse_one<T>(
    body: &str,
    family: char,
    parse: fn(&str) -> Result<T, CommandError>,
) -> Result<T, CommandError> {
    let mut operands = parse_all(body, family, parse)?;
    if operands.len() != 1 {
        return Err(CommandError::WrongOperandCount {
            family,
            expected: 1,
            found: operands.len(),
        });
    }
    Ok(operands.remove(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn axis(module: char, axis: char) -> AxisRef {
        AxisRef::new(module, axis)
    }

    #[test]
    fn classify_move_with_several_operands() {
        let cmd = Command::parse("o1A1000 2X-200o").unwrap();
        assert_eq!(
            cmd,
            Command::Move(vec![
                MoveOp { target: axis('1', 'A'), steps: 1000 },
                MoveOp { target: axis('2', 'X'), steps: -200 },
            ])
        );
    }

    #[test]
    fn classify_get_and_check() {
        assert_eq!(
            Command::parse("g1A 2Xg").unwrap(),
            Command::GetPosition(vec![axis('1', 'A'), axis('2', 'X')])
        );
        assert_eq!(
            Command::parse("c3Yc").unwrap(),
            Command::CheckMoving(vec![axis('3', 'Y')])
        );
    }

    #[test]
    fn classify_set_and_home() {
        assert_eq!(
            Command::parse("s4Z-500s").unwrap(),
            Command::SetPosition(MoveOp { target: axis('4', 'Z'), steps: -500 })
        );
        assert_eq!(Command::parse("h2Y").unwrap(), Command::Home(axis('2', 'Y')));
    }

    #[test]
    fn classify_actuator_bodies() {
        assert_eq!(
            Command::parse("m gsh on m").unwrap(),
            Command::Actuator(ActuatorOp::ShutterOpen)
        );
        assert_eq!(
            Command::parse("m led off m").unwrap(),
            Command::Actuator(ActuatorOp::LedOff)
        );
        assert_eq!(
            Command::parse("mld0m").unwrap(),
            Command::Actuator(ActuatorOp::ReadPhotodiode)
        );
        assert_eq!(
            Command::parse("m gsh toggle m").unwrap_err(),
            CommandError::UnknownActuator(String::from("gsh toggle"))
        );
    }

    #[test]
    fn classify_mode_macros() {
        assert_eq!(
            "ramanmode".parse::<Command>().unwrap(),
            Command::ModeMacro(ModeMacro::Raman)
        );
        assert_eq!(
            "imagemode".parse::<Command>().unwrap(),
            Command::ModeMacro(ModeMacro::Image)
        );
    }

    #[test]
    fn reject_unknown_and_empty() {
        assert_eq!(Command::parse("foobar").unwrap_err(), CommandError::UnknownFamily);
        assert_eq!(Command::parse("").unwrap_err(), CommandError::Empty);
        assert_eq!(Command::parse("   ").unwrap_err(), CommandError::Empty);
    }

    #[test]
    fn reject_missing_closing_sentinel() {
        assert_eq!(
            Command::parse("o1A100").unwrap_err(),
            CommandError::MissingSentinel('o')
        );
        assert_eq!(Command::parse("g").unwrap_err(), CommandError::MissingSentinel('g'));
    }

    #[test]
    fn reject_empty_bodies() {
        assert_eq!(Command::parse("oo").unwrap_err(), CommandError::EmptyBody('o'));
        assert_eq!(Command::parse("g  g").unwrap_err(), CommandError::EmptyBody('g'));
        assert_eq!(Command::parse("h").unwrap_err(), CommandError::EmptyBody('h'));
    }

    #[test]
    fn reject_non_integer_operands() {
        let err = Command::parse("o1A1.5o").unwrap_err();
        assert!(matches!(err, CommandError::InvalidOperand { ref token, .. } if token == "1A1.5"));
        assert!(matches!(
            Command::parse("s1Xs").unwrap_err(),
            CommandError::InvalidOperand { .. }
        ));
    }

    #[test]
    fn reject_multi_character_identifiers() {
        assert_eq!(
            Command::parse("g1ABg").unwrap_err(),
            CommandError::MalformedAxis(String::from("1AB"))
        );
        assert_eq!(
            Command::parse("h1").unwrap_err(),
            CommandError::MalformedAxis(String::from("1"))
        );
    }

    #[test]
    fn reject_extra_operands_for_single_axis_families() {
        assert_eq!(
            Command::parse("s1A5 2B6s").unwrap_err(),
            CommandError::WrongOperandCount { family: 's', expected: 1, found: 2 }
        );
    }

    #[test]
    fn move_is_atomic_on_overflow() {
        let mut state = DeviceState::default();
        state.axes.set('1', 'A', i64::MAX);
        let cmd = Command::parse("o2B10 1A1o").unwrap();
        let err = cmd.execute(&mut state, &ModePresets::default()).unwrap_err();
        assert_eq!(err, CommandError::PositionOverflow(axis('1', 'A')));
        assert!(!state.axes.contains('2', 'B'));
        assert_eq!(state.axes.position('1', 'A'), i64::MAX);
    }

    #[test]
    fn move_accumulates_repeated_axis() {
        let mut state = DeviceState::default();
        let cmd = Command::parse("o1A10 1A-3o").unwrap();
        assert_eq!(cmd.execute(&mut state, &ModePresets::default()).unwrap(), "");
        assert_eq!(state.axes.position('1', 'A'), 7);
    }

    #[test]
    fn mode_macro_uses_configured_target() {
        let presets = ModePresets { target: axis('9', 'Q'), offset: 10 };
        let mut state = DeviceState::default();
        Command::ModeMacro(ModeMacro::Raman)
            .execute(&mut state, &presets)
            .unwrap();
        assert_eq!(state.axes.position('9', 'Q'), 10);
        assert_eq!(state.axes.position('2', 'A'), 0);
    }

    #[test]
    fn axis_ref_displays_as_wire_address() {
        assert_eq!(axis('3', 'Y').to_string(), "3Y");
    }
}
