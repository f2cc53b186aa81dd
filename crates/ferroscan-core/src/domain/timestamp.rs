use std::fmt::{Display, Formatter};

use serde::de::Error as DeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::ValidationError;

/// 9999-12-31T23:59:59Z, the last instant RFC3339 can express.
const MAX_UNIX_SECONDS: i64 = 253_402_300_799;

/// Point in time a quote was observed, or a pass started.
///
/// Always held in UTC and limited to the Unix epoch through year 9999, so it
/// can always be written back out as RFC3339. Upstream feeds report epoch
/// seconds; config and stored records use RFC3339 with any offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// Epoch seconds as reported by the quote endpoints.
    pub fn from_unix_timestamp(seconds: i64) -> Result<Self, ValidationError> {
        if !(0..=MAX_UNIX_SECONDS).contains(&seconds) {
            return Err(ValidationError::TimestampOutOfRange { seconds });
        }
        OffsetDateTime::from_unix_timestamp(seconds)
            .map(Self)
            .map_err(|_| ValidationError::TimestampOutOfRange { seconds })
    }

    /// Parses RFC3339 and shifts any offset to UTC.
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let invalid = || ValidationError::InvalidTimestamp {
            value: input.to_owned(),
        };

        let parsed = OffsetDateTime::parse(input.trim(), &Rfc3339).map_err(|_| invalid())?;
        if !(0..=MAX_UNIX_SECONDS).contains(&parsed.unix_timestamp()) {
            return Err(invalid());
        }
        Ok(Self(parsed.to_offset(UtcOffset::UTC)))
    }

    pub fn unix_timestamp(self) -> i64 {
        self.0.unix_timestamp()
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .expect("range-checked UtcDateTime is RFC3339 formattable")
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}

impl<'de> Deserialize<'de> for UtcDateTime {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_time_seconds_become_rfc3339() {
        let as_of = UtcDateTime::from_unix_timestamp(1_717_185_600).expect("market close");

        assert_eq!(as_of.to_string(), "2024-05-31T20:00:00Z");
        assert_eq!(as_of.unix_timestamp(), 1_717_185_600);
    }

    #[test]
    fn exchange_local_offset_is_normalized() {
        let new_york = UtcDateTime::parse("2024-05-31T16:00:00-04:00").expect("valid offset");
        let utc = UtcDateTime::from_unix_timestamp(1_717_185_600).expect("market close");

        assert_eq!(new_york, utc);
        assert_eq!(new_york.format_rfc3339(), "2024-05-31T20:00:00Z");
    }

    #[test]
    fn rejects_pre_epoch_and_garbage() {
        assert_eq!(
            UtcDateTime::from_unix_timestamp(-1),
            Err(ValidationError::TimestampOutOfRange { seconds: -1 })
        );
        assert!(UtcDateTime::from_unix_timestamp(MAX_UNIX_SECONDS + 1).is_err());
        assert!(matches!(
            UtcDateTime::parse("1969-12-31T23:59:59Z"),
            Err(ValidationError::InvalidTimestamp { .. })
        ));
        assert!(UtcDateTime::parse("yesterday").is_err());
    }

    #[test]
    fn deserializes_offset_strings_as_utc() {
        let as_of: UtcDateTime =
            serde_json::from_str(r#""2024-06-03T09:30:00+02:00""#).expect("valid timestamp");

        assert_eq!(
            serde_json::to_string(&as_of).expect("serializable"),
            r#""2024-06-03T07:30:00Z""#
        );
    }
}
