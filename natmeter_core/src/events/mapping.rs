//! Row → [`EventRecord`] conversion.
//!
//! Lookups are by lower-cased column name. A missing column or a short row yields an empty
//! string (text) or `0.0` (numbers), and unparseable numbers become `0.0`, so most rows always
//! map. The one exception is a number that parses but is not finite, which rejects the row.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::events::models::{Dimension, EventRecord, MetricsShape};

pub mod columns {
    pub const ACCOUNT_ID: &str = "account_id";
    pub const SOURCE_ADDRESS: &str = "srcaddr";
    /// Tried only when `srcaddr` is not in the header at all.
    pub const SOURCE_ADDRESS_FALLBACK: &str = "pkt_srcaddr";
    pub const FLOW_DIRECTION: &str = "flow_direction";
    pub const NAT_GATEWAY_ID: &str = "nat_gateway_id";
    pub const AVAILABILITY_ZONE: &str = "availability_zone";
    pub const DESTINATION_ADDRESS: &str = "dstaddr";
    pub const USAGE_GB: &str = "usage_gb";
    pub const COST_USD: &str = "cost_usd";
}

pub mod dimension_keys {
    pub const BILLING_ACCOUNT_ID: &str = "billing_account_id";
    pub const NAT_GATEWAY_ID: &str = "nat_gateway_id";
    pub const AVAILABILITY_ZONE: &str = "availability_zone";
    pub const FLOW_DIRECTION: &str = "flow-direction";
    pub const SOURCE_IP: &str = "source_ip";
    pub const DESTINATION_IP: &str = "destination_ip";
}

/// Case-insensitive column name → position. Built once per result set.
#[derive(Debug, Clone, Default)]
pub struct HeaderIndex {
    positions: HashMap<String, usize>,
}

impl HeaderIndex {
    /// Duplicate names resolve to their last occurrence.
    pub fn new(header: &[String]) -> Self {
        let positions = header
            .iter()
            .enumerate()
            .map(|(i, name)| (name.trim().to_lowercase(), i))
            .collect();
        Self { positions }
    }

    pub fn position(&self, column: &str) -> Option<usize> {
        self.positions.get(&column.to_lowercase()).copied()
    }

    pub fn contains(&self, column: &str) -> bool {
        self.position(column).is_some()
    }
}

/// Why a row was left out of a batch. Recovered locally: logged, counted, never fatal.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RowRejection {
    #[error("column {column} holds non-finite number '{value}'")]
    NonFiniteNumber { column: String, value: String },
}

/// Per-batch mapping context.
#[derive(Debug, Clone)]
pub struct RowMapper {
    provider: String,
    include_destination: bool,
    metrics: MetricsShape,
    time: DateTime<Utc>,
}

impl RowMapper {
    pub fn new(
        provider: impl Into<String>,
        top_marker: &str,
        metrics: MetricsShape,
        time: DateTime<Utc>,
    ) -> Self {
        let provider = provider.into();
        let include_destination = is_top_class(&provider, top_marker);
        Self {
            provider,
            include_destination,
            metrics,
            time,
        }
    }

    pub fn includes_destination(&self) -> bool {
        self.include_destination
    }

    pub fn map_row(
        &self,
        row: &[String],
        index: &HeaderIndex,
    ) -> Result<EventRecord, RowRejection> {
        use self::columns::*;
        use self::dimension_keys as dk;

        let account_id = text(row, index, ACCOUNT_ID);
        let source = if index.contains(SOURCE_ADDRESS) {
            text(row, index, SOURCE_ADDRESS)
        } else {
            text(row, index, SOURCE_ADDRESS_FALLBACK)
        };
        let flow_direction = text(row, index, FLOW_DIRECTION);
        let nat_gateway_id = text(row, index, NAT_GATEWAY_ID);
        let availability_zone = text(row, index, AVAILABILITY_ZONE);
        let usage_gb = number(row, index, USAGE_GB)?;
        let cost_usd = number(row, index, COST_USD)?;

        let mut dimensions = vec![
            Dimension::fixed(dk::BILLING_ACCOUNT_ID, account_id),
            Dimension::label(dk::NAT_GATEWAY_ID, nat_gateway_id),
            Dimension::label(dk::AVAILABILITY_ZONE, availability_zone),
            Dimension::label(dk::FLOW_DIRECTION, flow_direction),
            Dimension::label(dk::SOURCE_IP, source),
        ];
        if self.include_destination {
            let destination = text(row, index, DESTINATION_ADDRESS);
            if !destination.is_empty() {
                dimensions.push(Dimension::label(dk::DESTINATION_IP, destination));
            }
        }

        Ok(EventRecord {
            provider: self.provider.clone(),
            id: uuid::Uuid::new_v4().to_string(),
            dimensions,
            time: self.time,
            metrics: self.metrics.metrics(usage_gb, cost_usd),
        })
    }
}

pub fn is_top_class(provider: &str, marker: &str) -> bool {
    !marker.is_empty() && provider.to_lowercase().contains(&marker.to_lowercase())
}

fn text(row: &[String], index: &HeaderIndex, column: &str) -> String {
    index
        .position(column)
        .and_then(|i| row.get(i))
        .cloned()
        .unwrap_or_default()
}

fn number(row: &[String], index: &HeaderIndex, column: &str) -> Result<f64, RowRejection> {
    let raw = text(row, index, column);
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        Ok(_) => Err(RowRejection::NonFiniteNumber {
            column: column.to_string(),
            value: raw,
        }),
        Err(_) => {
            if !trimmed.is_empty() {
                tracing::debug!(column, value = %raw, "unparseable number, using 0.0");
            }
            Ok(0.0)
        }
    }
}
