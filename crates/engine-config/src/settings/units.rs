use crate::error::SettingsError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr, time::Duration};

const SIZE_UNITS: [(&str, u64); 4] = [
    ("GB", 1 << 30),
    ("MB", 1 << 20),
    ("kB", 1 << 10),
    ("B", 1),
];

const DURATION_UNITS: [(&str, u64); 4] = [
    ("h", 3_600_000),
    ("m", 60_000),
    ("s", 1_000),
    ("ms", 1),
];

/// Splits `"1.5MB"` into `(1.5, "MB")`.
fn split_quantity(input: &str) -> Option<(f64, &str)> {
    let input = input.trim();
    let split = input
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(input.len());
    let (number, unit) = input.split_at(split);
    let value: f64 = number.parse().ok()?;
    (value.is_finite() && value >= 0.0).then_some((value, unit.trim()))
}

/// A byte count written as `512B`, `64kB`, `1MB`, `2GB` (1024-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct DataSize(u64);

impl DataSize {
    pub const fn bytes(bytes: u64) -> Self {
        Self(bytes)
    }

    pub const fn kilobytes(kb: u64) -> Self {
        Self(kb << 10)
    }

    pub const fn megabytes(mb: u64) -> Self {
        Self(mb << 20)
    }

    pub fn as_bytes(&self) -> u64 {
        self.0
    }
}

impl FromStr for DataSize {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SettingsError::InvalidDataSize(s.to_string());
        let (value, unit) = split_quantity(s).ok_or_else(invalid)?;

        let multiplier = match unit {
            "B" | "" => 1,
            "kB" | "KB" => 1 << 10,
            "MB" => 1 << 20,
            "GB" => 1 << 30,
            _ => return Err(invalid()),
        };

        Ok(Self((value * multiplier as f64).round() as u64))
    }
}

impl fmt::Display for DataSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (unit, size) = SIZE_UNITS
            .iter()
            .find(|(_, size)| self.0 >= *size && self.0 % size == 0)
            .copied()
            .unwrap_or(("B", 1));
        write!(f, "{}{}", self.0 / size, unit)
    }
}

impl From<DataSize> for String {
    fn from(size: DataSize) -> Self {
        size.to_string()
    }
}

impl TryFrom<String> for DataSize {
    type Error = SettingsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// A duration written as `250ms`, `1s`, `5m` or `1h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct ConfigDuration(Duration);

impl ConfigDuration {
    pub const fn millis(ms: u64) -> Self {
        Self(Duration::from_millis(ms))
    }

    pub const fn secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl From<Duration> for ConfigDuration {
    fn from(duration: Duration) -> Self {
        Self(duration)
    }
}

impl FromStr for ConfigDuration {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || SettingsError::InvalidDuration(s.to_string());
        let (value, unit) = split_quantity(s).ok_or_else(invalid)?;

        let (_, millis) = DURATION_UNITS
            .iter()
            .find(|(name, _)| *name == unit)
            .ok_or_else(invalid)?;

        Ok(Self(Duration::from_secs_f64(value * *millis as f64 / 1_000.0)))
    }
}

impl fmt::Display for ConfigDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ms = self.0.as_millis() as u64;
        let (unit, size) = DURATION_UNITS
            .iter()
            .find(|(_, size)| ms >= *size && ms % size == 0)
            .copied()
            .unwrap_or(("ms", 1));
        write!(f, "{}{}", ms / size, unit)
    }
}

impl From<ConfigDuration> for String {
    fn from(duration: ConfigDuration) -> Self {
        duration.to_string()
    }
}

impl TryFrom<String> for ConfigDuration {
    type Error = SettingsError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sizes() {
        assert_eq!("512B".parse::<DataSize>().unwrap().as_bytes(), 512);
        assert_eq!("64kB".parse::<DataSize>().unwrap().as_bytes(), 65_536);
        assert_eq!("1.5MB".parse::<DataSize>().unwrap().as_bytes(), 1_572_864);
        assert_eq!(" 2GB ".parse::<DataSize>().unwrap().as_bytes(), 2 << 30);
        assert!("12 parsecs".parse::<DataSize>().is_err());
        assert!("-1MB".parse::<DataSize>().is_err());
    }

    #[test]
    fn displays_sizes_in_largest_exact_unit() {
        assert_eq!(DataSize::megabytes(128).to_string(), "128MB");
        assert_eq!(DataSize::bytes(1536).to_string(), "1536B");
        assert_eq!(DataSize::bytes(0).to_string(), "0B");
    }

    #[test]
    fn parses_durations() {
        assert_eq!(
            "250ms".parse::<ConfigDuration>().unwrap().as_duration(),
            Duration::from_millis(250)
        );
        assert_eq!(
            "5m".parse::<ConfigDuration>().unwrap().as_duration(),
            Duration::from_secs(300)
        );
        assert_eq!(
            "1.5s".parse::<ConfigDuration>().unwrap().as_duration(),
            Duration::from_millis(1500)
        );
        assert!("soon".parse::<ConfigDuration>().is_err());
        assert!("10".parse::<ConfigDuration>().is_err());
    }

    #[test]
    fn displays_durations() {
        assert_eq!(ConfigDuration::secs(60).to_string(), "1m");
        assert_eq!(ConfigDuration::millis(1500).to_string(), "1500ms");
        assert_eq!(ConfigDuration::secs(3600).to_string(), "1h");
    }
}
