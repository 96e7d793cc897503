use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{CoreError, Result};

/// Current UTC timestamp.
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Parse an RFC3339 timestamp as received on the ingestion boundary.
pub fn parse_rfc3339(s: &str) -> Result<OffsetDateTime> {
    OffsetDateTime::parse(s, &Rfc3339).map_err(CoreError::from)
}

/// Format a timestamp as RFC3339 for payloads and logs.
pub fn format_rfc3339(ts: OffsetDateTime) -> String {
    ts.format(&Rfc3339).unwrap_or_else(|_| ts.to_string())
}

/// Serde adapter for `Vec<OffsetDateTime>` fields, serialized as RFC3339
/// strings. `time::serde::rfc3339` only covers scalar and `Option` fields.
pub mod rfc3339_vec {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use time::OffsetDateTime;
    use time::format_description::well_known::Rfc3339;

    pub fn serialize<S: Serializer>(
        values: &[OffsetDateTime],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            out.push(value.format(&Rfc3339).map_err(serde::ser::Error::custom)?);
        }
        out.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<OffsetDateTime>, D::Error> {
        Vec::<String>::deserialize(deserializer)?
            .iter()
            .map(|s| OffsetDateTime::parse(s, &Rfc3339).map_err(serde::de::Error::custom))
            .collect()
    }
}
