//! Two-Line Element (TLE) set parser.
//!
//! Parses standard NORAD/Space-Track TLE format (2-line and 3-line with name)
//! into an [`OrbitalElements`] record. Unit conversion happens here, once:
//! degrees become radians and revolutions per day become radians per minute.
//!
//! # TLE Format Reference
//! ```text
//! Line 0 (optional): Satellite Name (up to 24 chars)
//! Line 1: 1 NNNNNC NNNNNAAA NNNNN.NNNNNNNN +.NNNNNNNN +NNNNN-N +NNNNN-N N NNNNN
//! Line 2: 2 NNNNN NNN.NNNN NNN.NNNN NNNNNNN NNN.NNNN NNN.NNNN NN.NNNNNNNNNNNNNN
//! ```
//!
//! # Example
//! ```
//! use groundtrack::elements::OrbitalElements;
//!
//! let line1 = "1 25544U 98067A   24001.50000000  .00016717  00000-0  10270-3 0  9009";
//! let line2 = "2 25544  51.6400 208.5000 0007417  68.0000 292.1000 15.49560000400004";
//!
//! let elements = OrbitalElements::from_tle(line1, line2).unwrap();
//! assert_eq!(elements.norad_id, 25544);
//! ```

use thiserror::Error;

use crate::constants::*;
use crate::elements::OrbitalElements;
use crate::time::Epoch;

/// Fixed width of both element lines, checksum included.
pub const LINE_LENGTH: usize = 69;

/// Ways an element set can be malformed. No partial record is ever produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedElementSet {
    #[error("Line {line} contains non-ASCII characters")]
    NonAscii { line: u8 },

    #[error("Line {line} length must be {LINE_LENGTH} characters, got {length}")]
    InvalidLength { line: u8, length: usize },

    #[error("Line {line} must start with '{line}', got '{found}'")]
    InvalidLineNumber { line: u8, found: char },

    #[error("Checksum on line {line} is not a digit: '{found}'")]
    InvalidChecksumCharacter { line: u8, found: char },

    #[error("Checksum failed on line {line}: expected {expected}, computed {computed}")]
    ChecksumFailed {
        line: u8,
        expected: u8,
        computed: u8,
    },

    #[error("NORAD IDs don't match between lines: {0} vs {1}")]
    NoradIdMismatch(u32, u32),

    #[error("Failed to parse field '{field}' from '{text}'")]
    ParseField { field: &'static str, text: String },

    #[error("Epoch day of year {0} is outside [1, 367)")]
    EpochDayOutOfRange(f64),

    #[error("Mean motion must be positive, got {0} rev/day")]
    NonPositiveMeanMotion(f64),

    #[error("No TLEs found in input")]
    Empty,
}

/// rev/day → rad/min
const REV_PER_DAY_TO_RAD_PER_MIN: f64 = TAU / MINUTES_PER_DAY;

impl OrbitalElements {
    /// Parse a TLE from two lines (without satellite name).
    pub fn from_tle(line1: &str, line2: &str) -> Result<Self, MalformedElementSet> {
        parse_with_name(None, line1, line2)
    }

    /// Parse a TLE from three lines (with satellite name on line 0).
    pub fn from_tle_3line(line0: &str, line1: &str, line2: &str) -> Result<Self, MalformedElementSet> {
        let name = line0.trim().trim_start_matches("0 ").trim().to_string();
        parse_with_name(Some(name), line1, line2)
    }

    /// Parse a string containing multiple TLEs (2-line or 3-line format).
    ///
    /// Handles mixed formats: lines starting with '1' begin a 2-line TLE,
    /// other non-empty lines are treated as satellite names (line 0).
    /// The first malformed set aborts the batch.
    pub fn parse_batch(input: &str) -> Result<Vec<Self>, MalformedElementSet> {
        let lines: Vec<&str> = input
            .lines()
            .map(|l| l.trim_end())
            .filter(|l| !l.is_empty())
            .collect();

        let mut sets = Vec::new();
        let mut i = 0;

        while i < lines.len() {
            if lines[i].starts_with('1') && i + 1 < lines.len() && lines[i + 1].starts_with('2') {
                sets.push(Self::from_tle(lines[i], lines[i + 1])?);
                i += 2;
            } else if i + 2 < lines.len()
                && lines[i + 1].starts_with('1')
                && lines[i + 2].starts_with('2')
            {
                sets.push(Self::from_tle_3line(lines[i], lines[i + 1], lines[i + 2])?);
                i += 3;
            } else {
                // Skip unrecognized lines
                i += 1;
            }
        }

        if sets.is_empty() {
            return Err(MalformedElementSet::Empty);
        }

        Ok(sets)
    }
}

/// Parse two element lines into a record.
pub fn parse(line1: &str, line2: &str) -> Result<OrbitalElements, MalformedElementSet> {
    OrbitalElements::from_tle(line1, line2)
}

fn parse_with_name(
    name: Option<String>,
    line1: &str,
    line2: &str,
) -> Result<OrbitalElements, MalformedElementSet> {
    let l1 = validate_line(line1, 1)?;
    let l2 = validate_line(line2, 2)?;

    // ── Line 1 ──
    let norad_id_1 = parse_catalog_number(&l1[2..7], "norad_id (line 1)")?;
    let classification = l1.as_bytes()[7] as char;
    let intl_designator = l1[9..17].trim().to_string();

    let epoch_year_2d: i32 = parse_field(&l1[18..20], "epoch_year")?;
    let epoch_year = if epoch_year_2d >= 57 {
        1900 + epoch_year_2d
    } else {
        2000 + epoch_year_2d
    };

    let epoch_day = parse_float(&l1[20..32], "epoch_day")?;
    if !(1.0..367.0).contains(&epoch_day) {
        return Err(MalformedElementSet::EpochDayOutOfRange(epoch_day));
    }

    let mean_motion_dot = parse_float(&l1[33..43], "mean_motion_dot")?;
    let mean_motion_ddot = parse_implied_decimal(&l1[44..52], "mean_motion_ddot")?;
    let bstar = parse_implied_decimal(&l1[53..61], "bstar")?;

    let ephemeris_type: u8 = parse_counter(&l1[62..63], "ephemeris_type")?;
    let element_set: u16 = parse_counter(&l1[64..68], "element_set")?;

    // ── Line 2 ──
    let norad_id_2 = parse_catalog_number(&l2[2..7], "norad_id (line 2)")?;
    if norad_id_1 != norad_id_2 {
        return Err(MalformedElementSet::NoradIdMismatch(norad_id_1, norad_id_2));
    }

    let inclination_deg = parse_float(&l2[8..16], "inclination")?;
    let raan_deg = parse_float(&l2[17..25], "raan")?;

    // Eccentricity has implied leading decimal point
    let ecc_digits = l2[26..33].trim();
    if ecc_digits.is_empty() || !ecc_digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MalformedElementSet::ParseField {
            field: "eccentricity",
            text: ecc_digits.to_string(),
        });
    }
    let eccentricity = parse_float(&format!("0.{ecc_digits}"), "eccentricity")?;

    let arg_perigee_deg = parse_float(&l2[34..42], "arg_perigee")?;
    let mean_anomaly_deg = parse_float(&l2[43..51], "mean_anomaly")?;
    let mean_motion_rev_day = parse_float(&l2[52..63], "mean_motion")?;
    if !(mean_motion_rev_day > 0.0) {
        return Err(MalformedElementSet::NonPositiveMeanMotion(mean_motion_rev_day));
    }

    let rev_number: u32 = parse_counter(&l2[63..68], "rev_number")?;

    Ok(OrbitalElements {
        name,
        norad_id: norad_id_1,
        classification,
        intl_designator,
        epoch: Epoch::from_tle_epoch(epoch_year, epoch_day),
        mean_motion_dot: mean_motion_dot * REV_PER_DAY_TO_RAD_PER_MIN / MINUTES_PER_DAY,
        mean_motion_ddot: mean_motion_ddot * REV_PER_DAY_TO_RAD_PER_MIN
            / (MINUTES_PER_DAY * MINUTES_PER_DAY),
        bstar,
        ephemeris_type,
        element_set,
        inclination: inclination_deg * DEG2RAD,
        raan: raan_deg * DEG2RAD,
        eccentricity,
        arg_perigee: arg_perigee_deg * DEG2RAD,
        mean_anomaly: mean_anomaly_deg * DEG2RAD,
        mean_motion: mean_motion_rev_day * REV_PER_DAY_TO_RAD_PER_MIN,
        rev_number,
    })
}

/// Check encoding, width, line number and checksum. Returns the trimmed line.
fn validate_line(line: &str, number: u8) -> Result<&str, MalformedElementSet> {
    let line = line.trim_end();

    if !line.is_ascii() {
        return Err(MalformedElementSet::NonAscii { line: number });
    }
    if line.len() != LINE_LENGTH {
        return Err(MalformedElementSet::InvalidLength {
            line: number,
            length: line.len(),
        });
    }

    let bytes = line.as_bytes();
    let first = bytes[0] as char;
    if first != char::from(b'0' + number) {
        return Err(MalformedElementSet::InvalidLineNumber {
            line: number,
            found: first,
        });
    }

    let expected = match bytes[LINE_LENGTH - 1] {
        b @ b'0'..=b'9' => b - b'0',
        other => {
            return Err(MalformedElementSet::InvalidChecksumCharacter {
                line: number,
                found: other as char,
            })
        }
    };
    let computed = compute_checksum(&line[..LINE_LENGTH - 1]);
    if expected != computed {
        return Err(MalformedElementSet::ChecksumFailed {
            line: number,
            expected,
            computed,
        });
    }

    Ok(line)
}

fn parse_field<T: std::str::FromStr>(s: &str, field: &'static str) -> Result<T, MalformedElementSet> {
    let text = s.trim();
    text.parse::<T>().map_err(|_| MalformedElementSet::ParseField {
        field,
        text: text.to_string(),
    })
}

/// Decimal field. `f64::from_str` also accepts `NaN` and `inf`, which no
/// element set carries.
fn parse_float(s: &str, field: &'static str) -> Result<f64, MalformedElementSet> {
    let value: f64 = parse_field(s, field)?;
    if !value.is_finite() {
        return Err(MalformedElementSet::ParseField {
            field,
            text: s.trim().to_string(),
        });
    }
    Ok(value)
}

/// Unsigned counter field; blank reads as zero.
fn parse_counter<T: std::str::FromStr + Default>(s: &str, field: &'static str) -> Result<T, MalformedElementSet> {
    let text = s.trim();
    if text.is_empty() {
        return Ok(T::default());
    }
    if !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MalformedElementSet::ParseField {
            field,
            text: text.to_string(),
        });
    }
    parse_field(text, field)
}

/// Catalog numbers are five digits, or Alpha-5 (a leading letter standing
/// for 10-33, skipping I and O) once the numeric range is exhausted.
fn parse_catalog_number(s: &str, field: &'static str) -> Result<u32, MalformedElementSet> {
    let text = s.trim();
    let err = || MalformedElementSet::ParseField {
        field,
        text: text.to_string(),
    };

    let first = text.chars().next().ok_or_else(err)?;
    if first.is_ascii_digit() {
        return text.parse::<u32>().map_err(|_| err());
    }

    let lead = match first {
        'A'..='H' => first as u32 - 'A' as u32 + 10,
        'J'..='N' => first as u32 - 'J' as u32 + 18,
        'P'..='Z' => first as u32 - 'P' as u32 + 23,
        _ => return Err(err()),
    };
    let rest = text[1..].parse::<u32>().map_err(|_| err())?;
    Ok(lead * 10_000 + rest)
}

/// Parse the TLE "implied decimal" format: " NNNNN-N" → float.
///
/// Examples: " 16538-4" → 0.16538e-4, "-11606-4" → -0.11606e-4
fn parse_implied_decimal(s: &str, field: &'static str) -> Result<f64, MalformedElementSet> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(0.0);
    }
    let err = || MalformedElementSet::ParseField {
        field,
        text: s.to_string(),
    };

    // Find the exponent sign (last + or - that isn't the leading sign)
    let bytes = s.as_bytes();
    let exp_pos = (1..bytes.len())
        .rev()
        .find(|&i| bytes[i] == b'+' || bytes[i] == b'-');

    let (mantissa_str, exp_str) = match exp_pos {
        Some(pos) => (&s[..pos], &s[pos..]),
        None => (s, "+0"),
    };

    // Add implied leading "0."
    let sign = if mantissa_str.starts_with('-') { "-" } else { "" };
    let digits = mantissa_str.trim_start_matches(['+', '-', ' ']);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(err());
    }

    format!("{sign}0.{digits}e{exp_str}")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(err)
}

/// Compute TLE checksum (mod-10 of sum of digits, '-' counts as 1).
pub fn compute_checksum(line: &str) -> u8 {
    let sum: u32 = line
        .bytes()
        .map(|b| match b {
            b'0'..=b'9' => (b - b'0') as u32,
            b'-' => 1,
            _ => 0,
        })
        .sum();
    (sum % 10) as u8
}
