//! Frequency Mapper.
//!
//! Maps the symbolic frequency strings produced by [`TimeSeries::infer_frequency`]
//! (an optional integer multiplier followed by a unit code, e.g. `"15T"`) onto
//! the container's integer time-codes, and validates a series' frequency against
//! the one a slot was created with.
//!
//! | Unit   | Codes            | Time-code |
//! |--------|------------------|-----------|
//! | second | `S`              | 1         |
//! | minute | `T`              | 2         |
//! | hour   | `H`              | 3         |
//! | day    | `D`              | 4         |
//! | month  | `M`, `MS`        | 5         |
//! | year   | `A`, `A-DEC`, `AS` | 6       |
//!
//! [`TimeSeries::infer_frequency`]: crate::series::TimeSeries::infer_frequency

use crate::error::{Result, WdmError};
use std::fmt;
use std::str::FromStr;

/// Sampling unit of a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum TimeCode {
    /// One second.
    Second = 1,
    /// One minute.
    Minute = 2,
    /// One hour.
    Hour = 3,
    /// One calendar day.
    #[default]
    Day = 4,
    /// One calendar month.
    Month = 5,
    /// One calendar year.
    Year = 6,
}

impl TimeCode {
    /// All time-codes in ascending order.
    pub const ALL: [TimeCode; 6] = [
        TimeCode::Second,
        TimeCode::Minute,
        TimeCode::Hour,
        TimeCode::Day,
        TimeCode::Month,
        TimeCode::Year,
    ];

    /// Creates a TimeCode from its integer code.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Second),
            2 => Some(Self::Minute),
            3 => Some(Self::Hour),
            4 => Some(Self::Day),
            5 => Some(Self::Month),
            6 => Some(Self::Year),
            _ => None,
        }
    }

    /// Returns the integer code stored in the container.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns the short unit name used in listings.
    pub fn name(self) -> &'static str {
        match self {
            Self::Second => "S",
            Self::Minute => "T",
            Self::Hour => "H",
            Self::Day => "D",
            Self::Month => "M",
            Self::Year => "A",
        }
    }

    /// Returns the unit's symbolic name.
    pub fn unit(self) -> &'static str {
        match self {
            Self::Second => "second",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// Length of one unit in seconds, or `None` for calendar units.
    pub fn seconds(self) -> Option<i64> {
        match self {
            Self::Second => Some(1),
            Self::Minute => Some(60),
            Self::Hour => Some(3_600),
            Self::Day => Some(86_400),
            Self::Month | Self::Year => None,
        }
    }
}

impl fmt::Display for TimeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Maps a frequency string to `(time-code, step multiplier)`.
///
/// The leading digits are the multiplier. A multiplier that is missing, does
/// not parse, or is zero becomes 1.
///
/// # Errors
///
/// Returns `WdmError::UnsupportedFrequency` if the unit code is not one of the
/// recognised codes.
///
/// # Examples
/// ```rust,ignore
/// use alopex_wdm::frequency::{to_time_code, TimeCode};
///
/// assert_eq!(to_time_code("15T")?, (TimeCode::Minute, 15));
/// assert_eq!(to_time_code("MS")?, (TimeCode::Month, 1));
/// ```
pub fn to_time_code(freq: &str) -> Result<(TimeCode, u32)> {
    let freq = freq.trim();
    let code = freq.trim_start_matches(|c: char| c.is_ascii_digit());
    let multiplier = &freq[..freq.len() - code.len()];

    let time_code = match code {
        "A" | "A-DEC" | "AS" => TimeCode::Year,
        "M" | "MS" => TimeCode::Month,
        "D" => TimeCode::Day,
        "H" => TimeCode::Hour,
        "T" => TimeCode::Minute,
        "S" => TimeCode::Second,
        _ => return Err(WdmError::UnsupportedFrequency(freq.to_string())),
    };

    let step = multiplier
        .parse::<u32>()
        .ok()
        .filter(|step| *step > 0)
        .unwrap_or(1);

    Ok((time_code, step))
}

/// Returns the canonical unit code for a time-code, the inverse of
/// [`to_time_code`] for a multiplier of 1.
pub fn from_time_code(time_code: TimeCode) -> &'static str {
    time_code.name()
}

/// A slot's fixed sampling frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Frequency {
    /// Sampling unit.
    pub time_code: TimeCode,
    /// Positive multiplier of the unit.
    pub step: u32,
}

impl Frequency {
    /// Creates a new frequency.
    pub fn new(time_code: TimeCode, step: u32) -> Self {
        Self { time_code, step }
    }

    /// Interval in seconds, or `None` for calendar units.
    pub fn interval_seconds(&self) -> Option<i64> {
        self.time_code
            .seconds()
            .map(|unit| unit * i64::from(self.step))
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.step == 1 {
            write!(f, "{}", self.time_code.name())
        } else {
            write!(f, "{}{}", self.step, self.time_code.name())
        }
    }
}

impl FromStr for Frequency {
    type Err = WdmError;

    fn from_str(s: &str) -> Result<Self> {
        let (time_code, step) = to_time_code(s)?;
        Ok(Self { time_code, step })
    }
}

/// Checks that data inferred at `data` matches a slot declared at `slot`.
///
/// The time-code is compared first.
///
/// # Errors
///
/// Returns `WdmError::FrequencyMismatch` or `WdmError::StepMismatch`.
pub fn validate_frequency(slot: Frequency, data: Frequency) -> Result<()> {
    if slot.time_code != data.time_code {
        return Err(WdmError::FrequencyMismatch {
            slot: slot.time_code.code(),
            data: data.time_code.code(),
        });
    }
    if slot.step != data.step {
        return Err(WdmError::StepMismatch {
            slot: slot.step,
            data: data.step,
        });
    }
    Ok(())
}
