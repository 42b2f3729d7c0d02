use chrono::{DateTime, Utc};

use crate::config::{DeliverySettings, EventTimeMode};
use crate::events::mapping::{HeaderIndex, RowMapper};
use crate::events::models::{DeliveryBatch, MetricsShape};
use crate::models::{RunDate, VariantResult};
use crate::{Error, Result};

/// Merges fetched result sets into one [`DeliveryBatch`] per provider label.
#[derive(Debug, Clone)]
pub struct EventBatcher {
    top_marker: String,
    event_time: EventTimeMode,
}

impl EventBatcher {
    pub fn new(top_marker: impl Into<String>, event_time: EventTimeMode) -> Self {
        Self {
            top_marker: top_marker.into(),
            event_time,
        }
    }

    pub fn from_settings(settings: &DeliverySettings) -> Self {
        Self::new(settings.top_marker.clone(), settings.event_time)
    }

    /// Rows of `results` are mapped in the given order. All result sets that carry a header
    /// must share the header of the first one; those without a header contribute nothing.
    #[tracing::instrument(level = "debug", skip(self, results), fields(result_sets = results.len()))]
    pub fn build_batch(
        &self,
        results: &[&VariantResult],
        provider: &str,
        metrics: MetricsShape,
        date: &RunDate,
    ) -> Result<DeliveryBatch> {
        let header = results
            .iter()
            .map(|r| &r.result.header)
            .find(|h| !h.is_empty());

        if let Some(header) = header {
            for r in results {
                if r.result.has_header() && !same_header(header, &r.result.header) {
                    return Err(Error::HeaderMismatch {
                        provider: provider.to_string(),
                        variant: r.variant.clone(),
                    });
                }
            }
        }

        let index = header.map(|h| HeaderIndex::new(h)).unwrap_or_default();
        let mapper = RowMapper::new(provider, &self.top_marker, metrics, self.event_time(date)?);

        let mut events = Vec::new();
        let mut skipped_rows = 0usize;
        for r in results {
            for (position, row) in r.result.rows.iter().enumerate() {
                match mapper.map_row(row, &index) {
                    Ok(event) => events.push(event),
                    Err(reason) => {
                        skipped_rows += 1;
                        tracing::warn!(
                            provider,
                            variant = %r.variant,
                            row = position + 1,
                            %reason,
                            "skipping malformed row"
                        );
                    }
                }
            }
        }

        tracing::info!(
            provider,
            events = events.len(),
            skipped_rows,
            destination = mapper.includes_destination(),
            "batch built"
        );
        Ok(DeliveryBatch {
            provider: provider.to_string(),
            variants: results.iter().map(|r| r.variant.clone()).collect(),
            events,
            skipped_rows,
        })
    }

    fn event_time(&self, date: &RunDate) -> Result<DateTime<Utc>> {
        match self.event_time {
            EventTimeMode::Now => Ok(Utc::now()),
            EventTimeMode::RunDate => date.start_of_day(),
        }
    }
}

fn same_header(a: &[String], b: &[String]) -> bool {
    a.len() == b.len()
        && a.iter()
            .zip(b)
            .all(|(x, y)| x.trim().eq_ignore_ascii_case(y.trim()))
}
