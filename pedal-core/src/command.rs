//! Applies console commands to a [`PedalBank`].

use core::fmt;

use heapless::Vec;

use pedal_proto::format;
use pedal_proto::{commands, Command, Reply};

use crate::bank::{BankState, PedalBank};
use crate::config::MAX_REPLIES;
use crate::settings::SettingsStore;

/// What one console line did.
#[derive(Debug, Default)]
pub struct Dispatch {
    /// Reply lines, in the order their commands fired.
    pub replies: Vec<Reply, MAX_REPLIES>,
    /// A command asked for a device restart.
    pub restart: bool,
    /// Matched commands whose payload was rejected.
    pub rejected: u8,
}

/// Run every command found in `line` against `bank`.
///
/// Lines without a recognised trigger do nothing. A rejected payload is
/// logged and does not stop later commands on the same line.
pub fn dispatch<S: SettingsStore>(bank: &mut PedalBank<S>, line: &str) -> Dispatch {
    let mut out = Dispatch::default();
    for m in commands(line) {
        match m.command {
            Ok(command) => {
                debug!("command {:?}", m.trigger);
                if let Some(reply) = apply(bank, command) {
                    push_reply(&mut out, reply);
                }
            }
            Err(e) => {
                warn!("{:?} rejected: {:?}", m.trigger, e);
                out.rejected = out.rejected.saturating_add(1);
            }
        }
    }
    out.restart = bank.state() == BankState::RestartPending;
    out
}

fn apply<S: SettingsStore>(
    bank: &mut PedalBank<S>,
    command: Command,
) -> Option<Result<Reply, fmt::Error>> {
    match command {
        Command::ClearStore => {
            bank.clear_store();
            Some(format::done())
        }
        Command::Reset => {
            bank.reset_to_defaults();
            None
        }
        Command::GetUsage => Some(format::usage(&bank.enabled())),
        Command::GetMap => Some(format::output_maps(&bank.output_maps())),
        Command::GetInverted => Some(format::inverted(&bank.inverted())),
        Command::GetSmooth => Some(format::smoothing(&bank.smoothing())),
        Command::GetCalibration => Some(format::calibrations(&bank.calibrations())),
        Command::GetBits => Some(format::bit_depths(&bank.bit_depths())),
        Command::SetInverted(flags) => {
            bank.set_inverted(flags);
            None
        }
        Command::SetSmoothing(flags) => {
            bank.set_smoothing(flags);
            None
        }
        Command::SetOutputMap(role, map) => {
            bank.set_output_map(role, map);
            None
        }
        Command::SetBits(bits) => {
            for (role, bits) in pedal_proto::Role::ALL.into_iter().zip(bits) {
                bank.set_bit_depths(role, bits);
            }
            None
        }
        Command::ResetCalibration => {
            bank.reset_calibrations();
            None
        }
        Command::SetCalibration(quads) => {
            if let Err(e) = bank.set_calibrations(quads) {
                warn!("calibration rejected: {:?}", e);
            }
            None
        }
    }
}

fn push_reply(out: &mut Dispatch, reply: Result<Reply, fmt::Error>) {
    match reply {
        Ok(reply) => {
            if out.replies.push(reply).is_err() {
                warn!("too many replies, one dropped");
            }
        }
        Err(_) => warn!("reply did not fit"),
    }
}
