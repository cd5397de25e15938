//! Throughput calculation from device tick counts
//!
//! The device reports how many ticks of its counter elapsed while moving a
//! fixed amount of data. The rate in bits per second is
//! `(data_len * frequency) / (ticks * count_div)`.

use serde::{Deserialize, Serialize};
use std::io::Write;
use std::num::ParseIntError;
use thiserror::Error;

/// Prefix of every throughput record
pub const RECORD_PREFIX: &str = "Throughput: ";

/// Fixed physical parameters of the throughput formula
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThroughputConstants {
    /// Bits transferred per measurement
    pub data_len: u64,
    /// Counter clock frequency in Hz
    pub frequency: f64,
    /// Divisor applied by the device to its raw counter
    pub count_div: u64,
}

impl Default for ThroughputConstants {
    fn default() -> Self {
        Self {
            data_len: 4_194_304 * 32,
            frequency: 100e6,
            count_div: 1000,
        }
    }
}

impl ThroughputConstants {
    /// Check that the formula cannot divide by zero or produce NaN
    pub fn validate(&self) -> Result<(), String> {
        if self.data_len == 0 {
            return Err("data_len must be positive".to_string());
        }
        if !(self.frequency.is_finite() && self.frequency > 0.0) {
            return Err(format!("frequency must be positive and finite, got {}", self.frequency));
        }
        if self.count_div == 0 {
            return Err("count_div must be positive".to_string());
        }
        Ok(())
    }

    /// Bits per second for a non-zero tick count
    pub fn bits_per_second(&self, ticks: u64) -> Result<f64, MalformedTickCountError> {
        if ticks == 0 {
            return Err(MalformedTickCountError::Zero);
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = (self.data_len as f64 * self.frequency) / (ticks as f64 * self.count_div as f64);
        Ok(rate)
    }
}

/// Payload line that is not a usable tick count
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MalformedTickCountError {
    /// Not a non-negative decimal integer
    #[error("Malformed tick count {payload:?}: {source}")]
    Invalid {
        /// Offending payload
        payload: String,
        /// Parse failure
        #[source]
        source: ParseIntError,
    },

    /// Zero ticks would divide by zero
    #[error("Tick count is zero, throughput undefined")]
    Zero,
}

/// Parse a decimal tick count
pub fn parse_ticks(payload: &str) -> Result<u64, MalformedTickCountError> {
    payload
        .trim()
        .parse()
        .map_err(|source| MalformedTickCountError::Invalid {
            payload: payload.to_string(),
            source,
        })
}

/// Engineering-unit formatter for throughput values
pub trait EngFormatter {
    /// Render `value` with a magnitude prefix and unit
    fn format(&self, value: f64) -> String;
}

const SI_PREFIXES: [(i32, &str); 21] = [
    (-30, "q"),
    (-27, "r"),
    (-24, "y"),
    (-21, "z"),
    (-18, "a"),
    (-15, "f"),
    (-12, "p"),
    (-9, "n"),
    (-6, "\u{b5}"),
    (-3, "m"),
    (0, ""),
    (3, "k"),
    (6, "M"),
    (9, "G"),
    (12, "T"),
    (15, "P"),
    (18, "E"),
    (21, "Z"),
    (24, "Y"),
    (27, "R"),
    (30, "Q"),
];

/// SI engineering notation: `13.4218 Gb/s`
#[derive(Debug, Clone)]
pub struct SiFormatter {
    unit: String,
    separator: String,
}

impl SiFormatter {
    /// Create a formatter for `unit`
    pub fn new(unit: &str) -> Self {
        Self {
            unit: unit.to_string(),
            separator: " ".to_string(),
        }
    }
}

impl Default for SiFormatter {
    fn default() -> Self {
        Self::new("b/s")
    }
}

impl EngFormatter for SiFormatter {
    fn format(&self, value: f64) -> String {
        let (min_pow, max_pow) = (SI_PREFIXES[0].0, SI_PREFIXES[SI_PREFIXES.len() - 1].0);
        let magnitude = value.abs();

        #[allow(clippy::cast_possible_truncation)]
        let mut pow10 = if magnitude == 0.0 || !magnitude.is_finite() {
            0
        } else {
            ((magnitude.log10() / 3.0).floor() * 3.0) as i32
        };
        pow10 = pow10.clamp(min_pow, max_pow);

        let mut mantissa = value / 10f64.powi(pow10);
        if format_general(mantissa).parse::<f64>().map_or(false, |m| m.abs() >= 1000.0)
            && pow10 < max_pow
        {
            mantissa /= 1000.0;
            pow10 += 3;
        }

        let prefix = SI_PREFIXES
            .iter()
            .find(|(p, _)| *p == pow10)
            .map_or("", |(_, prefix)| prefix);

        if self.unit.is_empty() && prefix.is_empty() {
            format_general(mantissa)
        } else {
            format!("{}{}{}{}", format_general(mantissa), self.separator, prefix, self.unit)
        }
    }
}

/// `%g` rendering: six significant digits, trailing zeros removed
fn format_general(value: f64) -> String {
    const PRECISION: i32 = 6;

    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }

    let sci = format!("{:.*e}", (PRECISION - 1) as usize, value);
    let (digits, exp) = sci.split_once('e').unwrap_or((&sci, "0"));
    let exp: i32 = exp.parse().unwrap_or(0);

    if exp < -4 || exp >= PRECISION {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", trim_fraction(digits), sign, exp.abs())
    } else {
        #[allow(clippy::cast_sign_loss)]
        let decimals = (PRECISION - 1 - exp) as usize;
        trim_fraction(&format!("{value:.decimals$}")).to_string()
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

/// One computed throughput measurement
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputSample {
    /// Tick count reported by the device
    pub ticks: u64,
    /// Computed rate
    pub bits_per_second: f64,
    /// Text appended to the record sink (without separator)
    pub record: String,
}

/// Throughput recording errors
#[derive(Error, Debug)]
pub enum ThroughputError {
    /// Payload is not a usable tick count
    #[error(transparent)]
    Malformed(#[from] MalformedTickCountError),

    /// Record sink rejected the write
    #[error("Throughput sink write failed: {0}")]
    Sink(#[from] std::io::Error),
}

/// Turns tick counts into throughput records appended to a text sink
pub struct ThroughputCalculator<T: Write> {
    sink: T,
    constants: ThroughputConstants,
    formatter: Box<dyn EngFormatter>,
    separator: String,
    records: u64,
}

impl<T: Write> ThroughputCalculator<T> {
    /// Create a calculator using the SI formatter and no record separator
    pub fn new(sink: T, constants: ThroughputConstants) -> Self {
        Self {
            sink,
            constants,
            formatter: Box::new(SiFormatter::default()),
            separator: String::new(),
            records: 0,
        }
    }

    /// Replace the engineering-unit formatter
    #[must_use]
    pub fn with_formatter(mut self, formatter: Box<dyn EngFormatter>) -> Self {
        self.formatter = formatter;
        self
    }

    /// Text written after every record
    #[must_use]
    pub fn with_separator(mut self, separator: &str) -> Self {
        self.separator = separator.to_string();
        self
    }

    /// Compute the throughput for `payload` and append its record
    pub fn record(&mut self, payload: &str) -> Result<ThroughputSample, ThroughputError> {
        let ticks = parse_ticks(payload)?;
        let bits_per_second = self.constants.bits_per_second(ticks)?;
        let record = format!("{RECORD_PREFIX}{}", self.formatter.format(bits_per_second));

        tracing::info!("Time passed: {ticks}");
        tracing::info!("{record}");

        // Record and separator go out in a single write.
        self.sink
            .write_all(format!("{record}{}", self.separator).as_bytes())?;
        self.records += 1;

        Ok(ThroughputSample {
            ticks,
            bits_per_second,
            record,
        })
    }

    /// Number of records appended so far
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Flush pending records
    pub fn flush(&mut self) -> std::io::Result<()> {
        self.sink.flush()
    }

    /// Flush and hand back the sink
    pub fn finish(mut self) -> std::io::Result<T> {
        self.sink.flush()?;
        Ok(self.sink)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formula_is_exact() {
        let constants = ThroughputConstants {
            data_len: 134_217_728,
            frequency: 1e8,
            count_div: 1000,
        };
        assert_eq!(constants, ThroughputConstants::default());
        assert_eq!(constants.bits_per_second(1000).unwrap(), 13_421_772_800.0);
    }

    #[test]
    fn test_zero_ticks_rejected() {
        let constants = ThroughputConstants::default();
        assert_eq!(constants.bits_per_second(0), Err(MalformedTickCountError::Zero));
    }

    #[test]
    fn test_parse_ticks() {
        assert_eq!(parse_ticks("1000").unwrap(), 1000);
        assert_eq!(parse_ticks(" 42 ").unwrap(), 42);
        assert!(matches!(parse_ticks("-5"), Err(MalformedTickCountError::Invalid { .. })));
        assert!(matches!(parse_ticks("12ab"), Err(MalformedTickCountError::Invalid { .. })));
        assert!(matches!(parse_ticks(""), Err(MalformedTickCountError::Invalid { .. })));
    }

    #[test]
    fn test_si_formatter() {
        let f = SiFormatter::default();
        assert_eq!(f.format(13_421_772_800.0), "13.4218 Gb/s");
        assert_eq!(f.format(0.0), "0 b/s");
        assert_eq!(f.format(1000.0), "1 kb/s");
        assert_eq!(f.format(999.9999), "1 kb/s");
        assert_eq!(f.format(1.5e6), "1.5 Mb/s");
        assert_eq!(f.format(123.0), "123 b/s");
        assert_eq!(f.format(0.0025), "2.5 mb/s");
        assert_eq!(f.format(2.5e33), "2500 Qb/s");
    }

    #[test]
    fn test_format_general() {
        assert_eq!(format_general(13.4217728), "13.4218");
        assert_eq!(format_general(1.0), "1");
        assert_eq!(format_general(100.5), "100.5");
        assert_eq!(format_general(1_234_567.0), "1.23457e+06");
        assert_eq!(format_general(0.000_012_5), "1.25e-05");
    }

    #[test]
    fn test_records_have_no_separator_by_default() {
        let mut calc = ThroughputCalculator::new(Vec::new(), ThroughputConstants::default());
        let sample = calc.record("1000").unwrap();
        assert_eq!(sample.ticks, 1000);
        assert_eq!(sample.record, "Throughput: 13.4218 Gb/s");
        calc.record("2000").unwrap();
        assert_eq!(calc.records(), 2);

        let text = String::from_utf8(calc.finish().unwrap()).unwrap();
        assert_eq!(text, "Throughput: 13.4218 Gb/sThroughput: 6.71089 Gb/s");
    }

    #[test]
    fn test_separator_and_custom_formatter() {
        struct Raw;
        impl EngFormatter for Raw {
            fn format(&self, value: f64) -> String {
                format!("{value}")
            }
        }

        let mut calc = ThroughputCalculator::new(Vec::new(), ThroughputConstants::default())
            .with_formatter(Box::new(Raw))
            .with_separator("\n");
        calc.record("1000").unwrap();
        assert!(matches!(calc.record("0"), Err(ThroughputError::Malformed(MalformedTickCountError::Zero))));

        let text = String::from_utf8(calc.finish().unwrap()).unwrap();
        assert_eq!(text, "Throughput: 13421772800\n");
    }

    #[test]
    fn test_constants_validation() {
        assert!(ThroughputConstants::default().validate().is_ok());
        let bad = ThroughputConstants {
            count_div: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let nan = ThroughputConstants {
            frequency: f64::NAN,
            ..Default::default()
        };
        assert!(nan.validate().is_err());
    }
}
