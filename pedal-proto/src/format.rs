//! Reply and status line formatting.
//!
//! Replies are returned without the trailing newline; the console sink
//! terminates each line.

use core::fmt::{self, Write};

use heapless::String;

use crate::parser::{calibration_tag, output_map_tag};
use crate::types::{BitDepths, CalibrationQuad, CurveTable, Role};

/// Capacity of a single reply line.
pub const REPLY_CAPACITY: usize = 192;

/// One reply line.
pub type Reply = String<REPLY_CAPACITY>;

/// Terminator of every console line in both directions.
pub const LINE_END: u8 = b'\n';

/// The bytes of `line` as sent on the console, terminator included.
pub fn line_bytes(line: &str) -> impl Iterator<Item = u8> + '_ {
    line.bytes().chain(core::iter::once(LINE_END))
}

/// Acknowledgement sent after the store was wiped.
pub const DONE: &str = "done";

/// `done`
pub fn done() -> Result<Reply, fmt::Error> {
    let mut out = Reply::new();
    out.push_str(DONE).map_err(|_| fmt::Error)?;
    Ok(out)
}

/// `USAGE:throttle:true,brake:false,clutch:false`
pub fn usage(enabled: &[bool; 3]) -> Result<Reply, fmt::Error> {
    let mut out = Reply::new();
    out.write_str("USAGE:")?;
    for role in Role::ALL {
        if role.index() > 0 {
            out.write_char(',')?;
        }
        write!(out, "{}:{}", role.name(), enabled[role.index()])?;
    }
    Ok(out)
}

/// `MAP:TMAP:0,20,40,60,80,100,BMAP:...,CMAP:...`
pub fn output_maps(maps: &[CurveTable; 3]) -> Result<Reply, fmt::Error> {
    let mut out = Reply::new();
    out.write_str("MAP:")?;
    for role in Role::ALL {
        if role.index() > 0 {
            out.write_char(',')?;
        }
        out.write_str(output_map_tag(role))?;
        write_joined(&mut out, maps[role.index()].points())?;
    }
    Ok(out)
}

/// `INVER:0-1-0`
pub fn inverted(flags: &[bool; 3]) -> Result<Reply, fmt::Error> {
    flag_reply("INVER:", flags)
}

/// `SMOOTH:1-1-1`
pub fn smoothing(flags: &[bool; 3]) -> Result<Reply, fmt::Error> {
    flag_reply("SMOOTH:", flags)
}

/// `CALI:TCALI:c0,c1,c2,c3,BCALI:...,CCALI:...`
pub fn calibrations(quads: &[CalibrationQuad; 3]) -> Result<Reply, fmt::Error> {
    let mut out = Reply::new();
    out.write_str("CALI:")?;
    for role in Role::ALL {
        if role.index() > 0 {
            out.write_char(',')?;
        }
        out.write_str(calibration_tag(role))?;
        write_joined(&mut out, quads[role.index()].values())?;
    }
    Ok(out)
}

/// `BITS:<raw>-<hid>-<raw>-<hid>-<raw>-<hid>`
pub fn bit_depths(bits: &[BitDepths; 3]) -> Result<Reply, fmt::Error> {
    let mut out = Reply::new();
    out.write_str("BITS:")?;
    for role in Role::ALL {
        if role.index() > 0 {
            out.write_char('-')?;
        }
        let b = bits[role.index()];
        write!(out, "{}-{}", b.raw(), b.hid())?;
    }
    Ok(out)
}

/// One channel's status segment: `<prefix><beforeSerial>;<afterSerial>;<raw>;<beforeHID>,`
pub fn status_segment<W: Write>(
    w: &mut W,
    role: Role,
    before_serial: i32,
    after_serial: i32,
    raw: i32,
    before_hid: i32,
) -> fmt::Result {
    write!(
        w,
        "{}{};{};{};{},",
        role.status_prefix(),
        before_serial,
        after_serial,
        raw,
        before_hid
    )
}

fn flag_reply(tag: &str, flags: &[bool; 3]) -> Result<Reply, fmt::Error> {
    let mut out = Reply::new();
    write!(
        out,
        "{}{}-{}-{}",
        tag,
        u8::from(flags[0]),
        u8::from(flags[1]),
        u8::from(flags[2])
    )?;
    Ok(out)
}

fn write_joined<W: Write>(w: &mut W, values: &[i32]) -> fmt::Result {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            w.write_char(',')?;
        }
        write!(w, "{}", v)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_end_with_bare_newline() {
        let framed: heapless::Vec<u8, 8> = line_bytes(DONE).collect();
        assert_eq!(framed.as_slice(), b"done\n");
        assert!(!framed.contains(&b'\r'));
    }

    #[test]
    fn test_usage() {
        let reply = usage(&[true, false, false]).unwrap();
        assert_eq!(reply.as_str(), "USAGE:throttle:true,brake:false,clutch:false");
    }

    #[test]
    fn test_output_maps() {
        let t = CurveTable::new([0, 10, 20, 30, 40, 100]).unwrap();
        let reply = output_maps(&[t, CurveTable::LINEAR, CurveTable::LINEAR]).unwrap();
        assert_eq!(
            reply.as_str(),
            "MAP:TMAP:0,10,20,30,40,100,BMAP:0,20,40,60,80,100,CMAP:0,20,40,60,80,100"
        );
    }

    #[test]
    fn test_flags() {
        assert_eq!(inverted(&[false, true, false]).unwrap().as_str(), "INVER:0-1-0");
        assert_eq!(smoothing(&[true, true, true]).unwrap().as_str(), "SMOOTH:1-1-1");
    }

    #[test]
    fn test_calibrations_fit_at_full_width() {
        let wide = CalibrationQuad::full_scale(16_777_215);
        let reply = calibrations(&[wide; 3]).unwrap();
        assert!(reply.starts_with("CALI:TCALI:0,16777215,0,16777215,BCALI:"));
        assert!(reply.ends_with("CCALI:0,16777215,0,16777215"));
    }

    #[test]
    fn test_bit_depths() {
        let bits = [
            BitDepths::new(1023, 255).unwrap(),
            BitDepths::DEFAULT,
            BitDepths::new(4095, 255).unwrap(),
        ];
        assert_eq!(
            bit_depths(&bits).unwrap().as_str(),
            "BITS:1023-255-65535-65535-4095-255"
        );
    }

    #[test]
    fn test_status_segment() {
        let mut line: String<32> = String::new();
        status_segment(&mut line, Role::Brake, 50, 42, 512, 32767).unwrap();
        assert_eq!(line.as_str(), "B:50;42;512;32767,");
    }
}
