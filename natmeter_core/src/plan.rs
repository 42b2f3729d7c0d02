//! Declared query variants and how their results are grouped into delivery batches.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::events::models::MetricsShape;
use crate::models::QueryVariant;
use crate::{Error, Result};

pub const DEFAULT_PROVIDER_LABEL: &str = "NAT Gateway usage";

/// One outbound payload: the results of `variants`, in this order, under one provider label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSpec {
    pub provider: String,
    pub variants: Vec<String>,
    #[serde(default)]
    pub metrics: MetricsShape,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryPlan {
    /// Execution order.
    pub variants: Vec<QueryVariant>,
    /// Delivery order.
    pub batches: Vec<BatchSpec>,
}

#[derive(Debug, Deserialize)]
struct PlanFile {
    variants: Vec<VariantEntry>,
    batches: Vec<BatchSpec>,
}

#[derive(Debug, Deserialize)]
struct VariantEntry {
    id: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    query: Option<String>,
    /// Environment variable holding the query text.
    #[serde(default)]
    query_env: Option<String>,
}

impl DeliveryPlan {
    /// Public and private IP analyses delivered together with flat metrics.
    pub fn builtin(lookup: &dyn Fn(&str) -> Option<String>, provider: Option<&str>) -> Self {
        let query = |key: &str| lookup(key).unwrap_or_default().trim().to_string();
        Self {
            variants: vec![
                QueryVariant {
                    id: "public".to_string(),
                    title: "PUBLIC IP TRAFFIC ANALYSIS".to_string(),
                    query: query("PUBLIC_IP_QUERY"),
                },
                QueryVariant {
                    id: "private".to_string(),
                    title: "PRIVATE IP TRAFFIC ANALYSIS".to_string(),
                    query: query("PRIVATE_IP_QUERY"),
                },
            ],
            batches: vec![BatchSpec {
                provider: provider.unwrap_or(DEFAULT_PROVIDER_LABEL).to_string(),
                variants: vec!["public".to_string(), "private".to_string()],
                metrics: MetricsShape::Flat,
            }],
        }
    }

    /// Reads a YAML or JSON plan file (chosen by extension) and resolves `query_env` entries.
    #[tracing::instrument(level = "debug", skip(lookup))]
    pub fn from_path(path: &Path, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            Error::configuration(format!("cannot read plan file {}: {e}", path.display()))
        })?;
        let file: PlanFile = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&text).map_err(|e| {
                Error::configuration(format!("invalid plan file {}: {e}", path.display()))
            })?,
            _ => serde_yaml::from_str(&text).map_err(|e| {
                Error::configuration(format!("invalid plan file {}: {e}", path.display()))
            })?,
        };
        Self::from_file(file, lookup)
    }

    pub fn from_yaml(text: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let file: PlanFile = serde_yaml::from_str(text)
            .map_err(|e| Error::configuration(format!("invalid plan: {e}")))?;
        Self::from_file(file, lookup)
    }

    fn from_file(file: PlanFile, lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self> {
        let mut variants = Vec::with_capacity(file.variants.len());
        for v in file.variants {
            let query = match (v.query, v.query_env) {
                (Some(q), _) => q,
                (None, Some(key)) => lookup(&key).ok_or_else(|| {
                    Error::configuration(format!(
                        "query for variant '{}' not found in environment ({key})",
                        v.id
                    ))
                })?,
                (None, None) => String::new(),
            };
            variants.push(QueryVariant {
                title: v.title.unwrap_or_else(|| v.id.to_uppercase()),
                id: v.id,
                query: query.trim().to_string(),
            });
        }
        Ok(Self {
            variants,
            batches: file.batches,
        })
    }

    pub fn variant(&self, id: &str) -> Option<&QueryVariant> {
        self.variants.iter().find(|v| v.id == id)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn validate(&self) -> Result<()> {
        if self.variants.is_empty() {
            return Err(Error::configuration("plan declares no query variants"));
        }
        if self.batches.is_empty() {
            return Err(Error::configuration("plan declares no delivery batches"));
        }

        let mut ids = HashSet::new();
        for v in &self.variants {
            if v.id.trim().is_empty() {
                return Err(Error::configuration("variant id is empty"));
            }
            if !ids.insert(v.id.as_str()) {
                return Err(Error::configuration(format!("duplicate variant '{}'", v.id)));
            }
            if v.query.trim().is_empty() {
                return Err(Error::configuration(format!(
                    "query for variant '{}' is empty or not set",
                    v.id
                )));
            }
        }

        let mut batched = HashSet::new();
        for b in &self.batches {
            if b.provider.trim().is_empty() {
                return Err(Error::configuration("batch provider label is empty"));
            }
            if b.variants.is_empty() {
                return Err(Error::configuration(format!(
                    "batch '{}' has no variants",
                    b.provider
                )));
            }
            for id in &b.variants {
                if !ids.contains(id.as_str()) {
                    return Err(Error::configuration(format!(
                        "batch '{}' references unknown variant '{id}'",
                        b.provider
                    )));
                }
                if !batched.insert(id.as_str()) {
                    return Err(Error::configuration(format!(
                        "variant '{id}' is assigned to more than one batch"
                    )));
                }
            }
        }

        for v in &self.variants {
            if !batched.contains(v.id.as_str()) {
                tracing::warn!(variant = %v.id, "variant is not part of any batch; its rows are not delivered");
            }
        }
        Ok(())
    }
}
