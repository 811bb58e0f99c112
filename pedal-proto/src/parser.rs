//! Serial command recognition.
//!
//! Commands are not a grammar: every trigger is matched independently as a
//! case-sensitive substring of the whole line, in the fixed order of
//! [`Trigger::ORDER`]. One line can therefore fire several commands, e.g.
//! `"RESET GetUsage"` yields a reset followed by a usage query.
//!
//! Setter payloads are `-` separated integers that run from the end of the
//! trigger tag up to the next `,` or the end of the line:
//!
//! ```text
//! INVER:0-1-0
//! SMOOTH:1-1-1
//! TMAP:0-10-20-30-40-100
//! BITS:1023-255-65535-65535-4095-255
//! TCALI:0-1023-0-1023,BCALI:10-900-0-950,CCALI:0-4095-0-4095
//! ```

use crate::types::{BitDepths, CalibrationQuad, ConfigError, CurveTable, Role, CURVE_POINTS};

/// Maximum accepted command line length, excluding the terminator.
pub const MAX_LINE_LENGTH: usize = 256;

/// Why a matched trigger's payload was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    /// A field is not a decimal integer, or the tag has no payload.
    Malformed,
    /// Too few or too many `-` separated fields.
    WrongArity,
    /// Fields parsed but describe an invalid configuration.
    Invalid(ConfigError),
}

impl From<ConfigError> for CommandError {
    fn from(e: ConfigError) -> Self {
        CommandError::Invalid(e)
    }
}

/// A recognised serial command with its decoded payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Command {
    /// Wipe the persisted store.
    ClearStore,
    /// Restore defaults for every channel, then restart.
    Reset,
    GetUsage,
    GetMap,
    GetInverted,
    GetSmooth,
    GetCalibration,
    GetBits,
    /// Inversion flags in throttle, brake, clutch order.
    SetInverted([bool; 3]),
    /// Smoothing flags in throttle, brake, clutch order.
    SetSmoothing([bool; 3]),
    SetOutputMap(Role, CurveTable),
    SetBits([BitDepths; 3]),
    /// Reset every channel's calibration to its full raw range.
    ResetCalibration,
    SetCalibration([CalibrationQuad; 3]),
}

/// One entry of the ordered trigger table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Trigger {
    ClearStore,
    Reset,
    GetUsage,
    GetMap,
    GetInverted,
    GetSmooth,
    GetCalibration,
    GetBits,
    SetInverted,
    SetSmoothing,
    SetOutputMap(Role),
    SetBits,
    ResetCalibration,
    SetCalibration,
}

impl Trigger {
    /// Evaluation order; matches fire in this order regardless of their
    /// position in the line.
    pub const ORDER: [Trigger; 16] = [
        Trigger::ClearStore,
        Trigger::Reset,
        Trigger::GetUsage,
        Trigger::GetMap,
        Trigger::GetInverted,
        Trigger::GetSmooth,
        Trigger::GetCalibration,
        Trigger::GetBits,
        Trigger::SetInverted,
        Trigger::SetSmoothing,
        Trigger::SetOutputMap(Role::Throttle),
        Trigger::SetOutputMap(Role::Brake),
        Trigger::SetOutputMap(Role::Clutch),
        Trigger::SetBits,
        Trigger::ResetCalibration,
        Trigger::SetCalibration,
    ];

    /// The substring this trigger looks for.
    #[must_use]
    pub const fn tag(self) -> &'static str {
        match self {
            Trigger::ClearStore => "clearEEPROM",
            Trigger::Reset => "RESET",
            Trigger::GetUsage => "GetUsage",
            Trigger::GetMap => "GetMap",
            Trigger::GetInverted => "GetInverted",
            Trigger::GetSmooth => "GetSmooth",
            Trigger::GetCalibration => "GetCali",
            Trigger::GetBits => "GetBits",
            Trigger::SetInverted => "INVER:",
            Trigger::SetSmoothing => "SMOOTH:",
            Trigger::SetOutputMap(role) => output_map_tag(role),
            Trigger::SetBits => "BITS:",
            Trigger::ResetCalibration => "CALIRESET",
            Trigger::SetCalibration => "CALI:",
        }
    }

    /// Whether this trigger fires for `line`.
    #[must_use]
    pub fn matches(self, line: &str) -> bool {
        match self {
            // CALIRESET must not double as a full reset.
            Trigger::Reset => line
                .match_indices("RESET")
                .any(|(at, _)| !line[..at].ends_with("CALI")),
            // All three groups must be present.
            Trigger::SetCalibration => Role::ALL
                .iter()
                .all(|&role| line.contains(calibration_tag(role))),
            other => line.contains(other.tag()),
        }
    }

    /// Decode this trigger's command from `line`.
    ///
    /// Only meaningful when [`Trigger::matches`] returned `true`.
    pub fn parse(self, line: &str) -> Result<Command, CommandError> {
        let command = match self {
            Trigger::ClearStore => Command::ClearStore,
            Trigger::Reset => Command::Reset,
            Trigger::GetUsage => Command::GetUsage,
            Trigger::GetMap => Command::GetMap,
            Trigger::GetInverted => Command::GetInverted,
            Trigger::GetSmooth => Command::GetSmooth,
            Trigger::GetCalibration => Command::GetCalibration,
            Trigger::GetBits => Command::GetBits,
            Trigger::SetInverted => Command::SetInverted(parse_flags(line, self.tag())?),
            Trigger::SetSmoothing => Command::SetSmoothing(parse_flags(line, self.tag())?),
            Trigger::SetOutputMap(role) => {
                let points = parse_fields::<CURVE_POINTS>(payload(line, self.tag())?)?;
                Command::SetOutputMap(role, CurveTable::new(points)?)
            }
            Trigger::SetBits => {
                let f = parse_fields::<6>(payload(line, self.tag())?)?;
                Command::SetBits([
                    BitDepths::new(f[0], f[1])?,
                    BitDepths::new(f[2], f[3])?,
                    BitDepths::new(f[4], f[5])?,
                ])
            }
            Trigger::ResetCalibration => Command::ResetCalibration,
            Trigger::SetCalibration => {
                let mut quads = [CalibrationQuad::full_scale(0); 3];
                for role in Role::ALL {
                    let values = parse_fields::<4>(payload(line, calibration_tag(role))?)?;
                    quads[role.index()] = CalibrationQuad::new(values)?;
                }
                Command::SetCalibration(quads)
            }
        };
        Ok(command)
    }
}

/// A trigger that fired for a line, with its decode result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    pub trigger: Trigger,
    pub command: Result<Command, CommandError>,
}

/// All triggers that fire for `line`, in evaluation order.
///
/// A malformed payload only affects its own match; later triggers are still
/// evaluated.
pub fn commands(line: &str) -> impl Iterator<Item = Match> + '_ {
    Trigger::ORDER
        .into_iter()
        .filter(move |trigger| trigger.matches(line))
        .map(move |trigger| Match {
            trigger,
            command: trigger.parse(line),
        })
}

/// `TMAP:`, `BMAP:` or `CMAP:`.
#[must_use]
pub const fn output_map_tag(role: Role) -> &'static str {
    match role {
        Role::Throttle => "TMAP:",
        Role::Brake => "BMAP:",
        Role::Clutch => "CMAP:",
    }
}

/// `TCALI:`, `BCALI:` or `CCALI:`.
#[must_use]
pub const fn calibration_tag(role: Role) -> &'static str {
    match role {
        Role::Throttle => "TCALI:",
        Role::Brake => "BCALI:",
        Role::Clutch => "CCALI:",
    }
}

/// Text following `tag`, up to the next `,` or end of line.
fn payload<'a>(line: &'a str, tag: &str) -> Result<&'a str, CommandError> {
    let start = line.find(tag).ok_or(CommandError::Malformed)? + tag.len();
    let rest = &line[start..];
    let end = rest.find(',').unwrap_or(rest.len());
    Ok(rest[..end].trim())
}

/// Exactly `N` decimal fields separated by `-`.
fn parse_fields<const N: usize>(payload: &str) -> Result<[i32; N], CommandError> {
    let mut out = [0i32; N];
    let mut parts = payload.split('-');
    for slot in out.iter_mut() {
        let part = parts.next().ok_or(CommandError::WrongArity)?;
        *slot = part.trim().parse().map_err(|_| CommandError::Malformed)?;
    }
    if parts.next().is_some() {
        return Err(CommandError::WrongArity);
    }
    Ok(out)
}

/// Three `0`/`1` flags; any non-zero value counts as set.
fn parse_flags(line: &str, tag: &str) -> Result<[bool; 3], CommandError> {
    let fields = parse_fields::<3>(payload(line, tag)?)?;
    Ok(fields.map(|v| v != 0))
}

#[cfg(test)]
mod tests {
    extern crate std;
    use std::vec::Vec;

    use super::*;

    fn fired(line: &str) -> Vec<Trigger> {
        commands(line).map(|m| m.trigger).collect()
    }

    #[test]
    fn test_simple_queries() {
        assert_eq!(fired("GetBits"), [Trigger::GetBits]);
        assert_eq!(fired("GetCali"), [Trigger::GetCalibration]);
        assert_eq!(fired("clearEEPROM"), [Trigger::ClearStore]);
        assert!(fired("hello").is_empty());
        assert!(fired("").is_empty());
    }

    #[test]
    fn test_multiple_triggers_fire_in_table_order() {
        assert_eq!(
            fired("GetUsage RESET"),
            [Trigger::Reset, Trigger::GetUsage]
        );
    }

    #[test]
    fn test_calireset_is_not_reset() {
        assert_eq!(fired("CALIRESET"), [Trigger::ResetCalibration]);
        assert_eq!(
            fired("CALIRESET RESET"),
            [Trigger::Reset, Trigger::ResetCalibration]
        );
    }

    #[test]
    fn test_set_output_map() {
        let m: Vec<Match> = commands("TMAP:0-10-20-30-40-100").collect();
        assert_eq!(m.len(), 1);
        let expected = CurveTable::new([0, 10, 20, 30, 40, 100]).unwrap();
        assert_eq!(m[0].command, Ok(Command::SetOutputMap(Role::Throttle, expected)));
    }

    #[test]
    fn test_output_map_wrong_arity() {
        let m: Vec<Match> = commands("BMAP:0-10-20").collect();
        assert_eq!(m[0].command, Err(CommandError::WrongArity));
        let m: Vec<Match> = commands("BMAP:0-10-20-30-40-50-60").collect();
        assert_eq!(m[0].command, Err(CommandError::WrongArity));
    }

    #[test]
    fn test_output_map_out_of_range() {
        let m: Vec<Match> = commands("CMAP:0-10-20-30-40-200").collect();
        assert_eq!(
            m[0].command,
            Err(CommandError::Invalid(ConfigError::OutOfRange))
        );
    }

    #[test]
    fn test_malformed_payload_does_not_block_later_triggers() {
        let m: Vec<Match> = commands("INVER:x-1-0,GetSmooth").collect();
        assert_eq!(m.len(), 2);
        assert_eq!(m[0].trigger, Trigger::GetSmooth);
        assert_eq!(m[0].command, Ok(Command::GetSmooth));
        assert_eq!(m[1].command, Err(CommandError::Malformed));
    }

    #[test]
    fn test_flags_payload_stops_at_comma() {
        let m: Vec<Match> = commands("SMOOTH:1-0-2,garbage").collect();
        assert_eq!(m[0].command, Ok(Command::SetSmoothing([true, false, true])));
    }

    #[test]
    fn test_set_bits() {
        let m: Vec<Match> = commands("BITS:1023-255-65535-65535-4095-255").collect();
        assert_eq!(m.len(), 1);
        let Ok(Command::SetBits(bits)) = m[0].command else {
            panic!("unexpected {:?}", m[0].command);
        };
        assert_eq!((bits[0].raw(), bits[0].hid()), (1023, 255));
        assert_eq!((bits[2].raw(), bits[2].hid()), (4095, 255));

        let m: Vec<Match> = commands("BITS:1000-255-65535-65535-4095-255").collect();
        assert_eq!(
            m[0].command,
            Err(CommandError::Invalid(ConfigError::InvalidBitDepth))
        );
    }

    #[test]
    fn test_set_calibration_reads_each_group() {
        let line = "TCALI:0-1023-10-1000,BCALI:5-900-0-950,CCALI:0-4095-0-4095";
        let m: Vec<Match> = commands(line).collect();
        assert_eq!(m.len(), 1);
        let Ok(Command::SetCalibration(quads)) = m[0].command else {
            panic!("unexpected {:?}", m[0].command);
        };
        assert_eq!(quads[0].values(), &[0, 1023, 10, 1000]);
        assert_eq!(quads[1].values(), &[5, 900, 0, 950]);
        assert_eq!(quads[2].values(), &[0, 4095, 0, 4095]);
    }

    #[test]
    fn test_calibration_needs_all_groups() {
        assert!(fired("TCALI:0-1023-0-1023,BCALI:0-1023-0-1023").is_empty());
    }

    #[test]
    fn test_calibration_rejects_inverted_deadzone() {
        let line = "TCALI:600-1023-0-500,BCALI:0-900-0-950,CCALI:0-4095-0-4095";
        let m: Vec<Match> = commands(line).collect();
        assert_eq!(
            m[0].command,
            Err(CommandError::Invalid(ConfigError::InvertedDeadzone))
        );
    }

    #[test]
    fn test_empty_payload_is_malformed() {
        let m: Vec<Match> = commands("INVER:").collect();
        assert_eq!(m[0].command, Err(CommandError::Malformed));
    }
}
