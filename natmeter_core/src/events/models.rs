use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a dimension is treated by the metering API.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionKind {
    Fixed,
    Label,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub key: String,
    #[serde(rename = "type")]
    pub kind: DimensionKind,
    pub value: String,
}

impl Dimension {
    pub fn fixed(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: DimensionKind::Fixed,
            value: value.into(),
        }
    }

    pub fn label(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: DimensionKind::Label,
            value: value.into(),
        }
    }
}

/// Wire layout of the `metrics` list; older and newer provider generations differ.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricsShape {
    /// `[{"usage_gb": u, "cost_usd": c}]`
    #[default]
    Flat,
    /// `[{"value": u, "type": "usage_gb"}, {"value": c, "type": "cost_usd"}]`
    Typed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Metric {
    Usage {
        usage_gb: f64,
        cost_usd: f64,
    },
    Typed {
        value: f64,
        #[serde(rename = "type")]
        kind: String,
    },
}

impl MetricsShape {
    pub fn metrics(self, usage_gb: f64, cost_usd: f64) -> Vec<Metric> {
        match self {
            Self::Flat => vec![Metric::Usage { usage_gb, cost_usd }],
            Self::Typed => vec![
                Metric::Typed {
                    value: usage_gb,
                    kind: "usage_gb".to_string(),
                },
                Metric::Typed {
                    value: cost_usd,
                    kind: "cost_usd".to_string(),
                },
            ],
        }
    }
}

/// One usage observation sent to the metering API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub provider: String,
    /// UUID v4, unique per record.
    pub id: String,
    pub dimensions: Vec<Dimension>,
    #[serde(with = "rfc3339_seconds")]
    pub time: DateTime<Utc>,
    pub metrics: Vec<Metric>,
}

impl EventRecord {
    pub fn dimension(&self, key: &str) -> Option<&str> {
        self.dimensions
            .iter()
            .find(|d| d.key == key)
            .map(|d| d.value.as_str())
    }
}

/// Events of one or more result sets under one provider label. Built per delivery and
/// dropped once the call returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryBatch {
    pub provider: String,
    /// Variants whose rows were merged, in order.
    pub variants: Vec<String>,
    pub events: Vec<EventRecord>,
    /// Rows rejected by the row mapper.
    pub skipped_rows: usize,
}

/// `YYYY-MM-DDTHH:MM:SSZ`
mod rfc3339_seconds {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::Secs, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn event_serializes_to_metering_wire_shape() {
        let ev = EventRecord {
            provider: "NAT Gateway usage".to_string(),
            id: "3f0e".to_string(),
            dimensions: vec![
                Dimension::fixed("billing_account_id", "111111111111"),
                Dimension::label("source_ip", "10.0.0.5"),
            ],
            time: Utc.with_ymd_and_hms(2026, 2, 1, 7, 30, 5).unwrap(),
            metrics: MetricsShape::Flat.metrics(2.5, 0.1),
        };
        let v = serde_json::to_value(&ev).unwrap();
        assert_eq!(
            v,
            serde_json::json!({
                "provider": "NAT Gateway usage",
                "id": "3f0e",
                "dimensions": [
                    {"key": "billing_account_id", "type": "fixed", "value": "111111111111"},
                    {"key": "source_ip", "type": "label", "value": "10.0.0.5"}
                ],
                "time": "2026-02-01T07:30:05Z",
                "metrics": [{"usage_gb": 2.5, "cost_usd": 0.1}]
            })
        );
    }

    #[test]
    fn typed_metrics_are_one_entry_per_measure() {
        let v = serde_json::to_value(MetricsShape::Typed.metrics(2.5, 0.1)).unwrap();
        assert_eq!(
            v,
            serde_json::json!([
                {"value": 2.5, "type": "usage_gb"},
                {"value": 0.1, "type": "cost_usd"}
            ])
        );
    }
}
