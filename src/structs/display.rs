// SPDX-License-Identifier: Apache-2.0

//! Terminal rendering of analyses. Pure string builders so the CLI
//! can print them and the tests can look at them.

use crate::consts::DEFAULT_CI;

use super::analysis::VariableAnalysis;
use super::keep_bits::{keepbits, ThresholdPolicy};

const ENDC: &str = "\x1b[0m";

const FG_YELLOW: &str = "\x1b[93m";
const FG_WHITE: &str = "\x1b[97m";
const FG_BLACK: &str = "\x1b[30m";

const BG_BLUE: &str = "\x1b[44m";
const BG_GREEN: &str = "\x1b[42m";
const BG_RED: &str = "\x1b[41m";
const BG_GREY: &str = "\x1b[100m";

/// background colour ramp used to paint information from 0 to 1
const BG_COLOR_BAR: [&str; 16] = [
    "\x1b[40m",  // black
    "\x1b[100m", // bright black (dark grey)
    "\x1b[44m",  // blue
    "\x1b[104m", // bright blue
    "\x1b[42m",  // green
    "\x1b[102m", // bright green
    "\x1b[46m",  // cyan
    "\x1b[106m", // bright cyan
    "\x1b[43m",  // yellow
    "\x1b[103m", // bright yellow
    "\x1b[41m",  // red
    "\x1b[101m", // bright red
    "\x1b[45m",  // magenta
    "\x1b[105m", // bright magenta
    "\x1b[47m",  // white (light grey)
    "\x1b[107m", // bright white
];

fn bit_order(len: usize, reverse: bool) -> Box<dyn Iterator<Item = usize>> {
    if reverse {
        Box::new((0..len).rev())
    } else {
        Box::new(0..len)
    }
}

/// A ruler of bit positions with alternating colours so the rows
/// below can be read off against it.
pub fn format_bit_position(len: usize, width: usize, reverse: bool) -> String {
    let mut s = String::new();
    for i in bit_order(len, reverse) {
        if i % 2 == 0 {
            s.push_str(FG_WHITE);
            s.push_str(BG_GREY);
        } else {
            s.push_str(FG_BLACK);
            s.push_str(BG_GREEN);
        }
        s.push_str(&format!("{:>width$}", i, width = width));
    }
    s.push_str(ENDC);
    return s;
}

/// Per-bit information as percentages on the colour ramp.
pub fn format_bit_information(bi: &[f64], reverse: bool) -> String {
    let mut s = String::new();
    for i in bit_order(bi.len(), reverse) {
        let idx = ((bi[i] * BG_COLOR_BAR.len() as f64) as usize).min(BG_COLOR_BAR.len() - 1);
        s.push_str(BG_COLOR_BAR[idx]);
        s.push_str(&format!("{:>3.0}", bi[i] * 100.0));
    }
    s.push_str(ENDC);
    return s;
}

/// Bit counts coloured by field: sign on grey, exponent on red,
/// mantissa on blue.
pub fn format_bit_count(
    counts: &[u64],
    sign: u32,
    man: (u32, u32),
    exp: (u32, u32),
    width: usize,
    reverse: bool,
) -> String {
    let mut s = String::new();
    for i in bit_order(counts.len(), reverse) {
        let b = i as u32;
        if b == sign {
            s.push_str(FG_YELLOW);
            s.push_str(BG_GREY);
        } else if b >= exp.0 && b < exp.1 {
            s.push_str(FG_WHITE);
            s.push_str(BG_RED);
        } else if b >= man.0 && b < man.1 {
            s.push_str(FG_WHITE);
            s.push_str(BG_BLUE);
        }
        s.push_str(&format!("{:>width$}", counts[i], width = width));
    }
    s.push_str(ENDC);
    return s;
}

pub fn format_colour_bar() -> String {
    let mut s = String::from("\t");
    for (i, colour) in BG_COLOR_BAR.iter().enumerate() {
        s.push_str(colour);
        if i == 0 {
            s.push_str(FG_WHITE);
            s.push_str("   0");
        } else if i == BG_COLOR_BAR.len() - 1 {
            s.push_str(FG_BLACK);
            s.push_str(" 100");
        } else {
            s.push_str("   ");
        }
    }
    s.push_str(ENDC);
    s.push_str(" - information in % of the bit");
    return s;
}

pub fn format_count_legend() -> String {
    format!(
        "\t{}{} 0 {} - sign bit\n\t{}{} 1 {} - exponent\n\t{}{} 2 {} - mantissa",
        FG_YELLOW, BG_GREY, ENDC, FG_WHITE, BG_RED, ENDC, FG_WHITE, BG_BLUE, ENDC
    )
}

/// The per-variable block the display tool prints: name, type, the
/// position ruler over the information ramp, and the keep-bits result
/// at the default confidence.
pub fn format_variable(name: &str, record: &VariableAnalysis, reverse: bool) -> String {
    let kb = keepbits(
        &record.bitinfo,
        record.manbit,
        record.elements,
        DEFAULT_CI,
        ThresholdPolicy::default(),
    );

    let mut s = String::new();
    s.push_str(&format!("    var name: {}\n", name));
    s.push_str(&format!("        type: {}\n", record.type_name));
    s.push_str(&format_bit_position(record.bitinfo.len(), 4, reverse));
    s.push('\n');
    s.push_str(&format_bit_information(&record.bitinfo, reverse));
    s.push('\n');
    s.push_str(&format_colour_bar());
    s.push('\n');
    s.push_str(&format!("   keep bits: {}", kb));
    return s;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> VariableAnalysis {
        let mut bitinfo = vec![0.0; 32];
        bitinfo[22] = 0.95;
        VariableAnalysis {
            type_name: "float32".to_string(),
            itemsize: 4,
            byteorder: "=".to_string(),
            signbit: 31,
            manbit: (0, 23),
            expbit: (23, 31),
            elements: 10000,
            bitinfo,
            time_start: None,
            time_end: None,
            level: None,
            axis: Some(0),
            retainbits: None,
        }
    }

    #[test]
    fn ruler_lists_every_position() {
        let s = format_bit_position(32, 4, false);
        assert!(s.contains("   0"));
        assert!(s.contains("  31"));
        assert!(s.ends_with(ENDC));

        let r = format_bit_position(32, 4, true);
        // reversed ruler starts from the top bit
        assert!(r.find("  31").unwrap() < r.find("   0").unwrap());
    }

    #[test]
    fn information_row_scales_to_percent() {
        let s = format_bit_information(&[0.0, 0.5, 1.0], false);
        assert!(s.contains("  0"));
        assert!(s.contains(" 50"));
        assert!(s.contains("100"));
        // full information picks the last ramp colour
        assert!(s.contains(BG_COLOR_BAR[15]));
    }

    #[test]
    fn count_row_colours_the_fields() {
        let counts = vec![7u64; 32];
        let s = format_bit_count(&counts, 31, (0, 23), (23, 31), 3, false);
        assert!(s.contains(BG_BLUE));
        assert!(s.contains(BG_RED));
        assert!(s.contains(BG_GREY));
    }

    #[test]
    fn variable_block_reports_keep_bits() {
        let s = format_variable("tas", &record(), false);
        assert!(s.contains("var name: tas"));
        assert!(s.contains("type: float32"));
        assert!(s.contains("keep bits: 1"));
    }
}
