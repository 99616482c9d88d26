//! Human-readable duration values as they appear in the config file.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// A duration with one-second granularity and a stable human marshalling.
///
/// Values parse with the usual human suffixes (`2h3m4s`, `90s`, `10m`).
/// Marshalling decomposes into hours, minutes, and seconds, drops leading
/// and trailing zero units, and renders the zero duration as `0h`, so the
/// output always re-parses to the same value.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct HumanDuration(Duration);

impl HumanDuration {
    pub const fn from_secs(secs: u64) -> Self {
        Self(Duration::from_secs(secs))
    }

    pub fn as_secs(&self) -> u64 {
        self.0.as_secs()
    }

    pub fn duration(&self) -> Duration {
        self.0
    }
}

impl From<Duration> for HumanDuration {
    /// Sub-second precision is truncated away.
    fn from(d: Duration) -> Self {
        Self(Duration::from_secs(d.as_secs()))
    }
}

impl From<HumanDuration> for Duration {
    fn from(d: HumanDuration) -> Self {
        d.0
    }
}

impl fmt::Display for HumanDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.0.as_secs();
        if secs == 0 {
            return f.write_str("0h");
        }

        let parts = [(secs / 3600, "h"), (secs / 60 % 60, "m"), (secs % 60, "s")];
        let first = parts.iter().position(|&(n, _)| n != 0).unwrap();
        let last = parts.iter().rposition(|&(n, _)| n != 0).unwrap();

        for &(n, unit) in &parts[first..=last] {
            write!(f, "{n}{unit}")?;
        }

        Ok(())
    }
}

impl FromStr for HumanDuration {
    type Err = humantime::DurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        humantime::parse_duration(s).map(Self::from)
    }
}

impl serde::Serialize for HumanDuration {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for HumanDuration {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl serde::de::Visitor<'_> for Visitor {
            type Value = HumanDuration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a duration string such as `2h3m4s`")
            }

            fn visit_str<E: serde::de::Error>(self, value: &str) -> Result<Self::Value, E> {
                value.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_str(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marshal(secs: u64) -> String {
        HumanDuration::from_secs(secs).to_string()
    }

    #[test]
    fn zero_marshals_as_zero_hours() {
        assert_eq!(marshal(0), "0h");
    }

    #[test]
    fn trailing_and_leading_zero_units_are_stripped() {
        assert_eq!(marshal(2 * 3600), "2h");
        assert_eq!(marshal(2 * 3600 + 3 * 60), "2h3m");
        assert_eq!(marshal(2 * 3600 + 3 * 60 + 4), "2h3m4s");
        assert_eq!(marshal(90), "1m30s");
        assert_eq!(marshal(2), "2s");
        assert_eq!(marshal(600), "10m");
    }

    #[test]
    fn interior_zero_units_are_kept() {
        assert_eq!(marshal(2 * 3600 + 4), "2h0m4s");
    }

    #[test]
    fn round_trips_through_marshalling() {
        for secs in [0, 1, 59, 60, 61, 3599, 3600, 3601, 7384, 86400, 90061] {
            let d = HumanDuration::from_secs(secs);
            let back: HumanDuration = d.to_string().parse().unwrap();
            assert_eq!(back, d, "failed for {secs}s (marshalled `{d}`)");
        }
    }

    #[test]
    fn parses_human_forms() {
        assert_eq!(
            "2h3m4s".parse::<HumanDuration>().unwrap(),
            HumanDuration::from_secs(7384)
        );
        assert_eq!(
            "2s".parse::<HumanDuration>().unwrap(),
            HumanDuration::from_secs(2)
        );
        assert!("two seconds maybe".parse::<HumanDuration>().is_err());
    }
}
