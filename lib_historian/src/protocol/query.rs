//! # Typed Queries
//!
//! Caller supplied filters. They can be built in code or parsed from JSON;
//! either way [`TimeseriesQuery::validate`] / [`EventQuery::validate`] run
//! before anything is queued or sent, so a malformed query never reaches the
//! wire.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{HistorianError, Result};

/// Sampled values of one or more nodes over a time window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TimeseriesQuery {
    /// Node names as listed in the directory.
    pub nodes: Vec<String>,
    /// Window start, Unix seconds in the client clock.
    pub start: f64,
    /// Window end, Unix seconds in the client clock.
    pub end: f64,
    #[serde(default)]
    pub max_points: Option<u32>,
}

impl TimeseriesQuery {
    pub fn new<I, S>(nodes: I, start: f64, end: f64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            nodes: nodes.into_iter().map(Into::into).collect(),
            start,
            end,
            max_points: None,
        }
    }

    pub fn with_max_points(mut self, max_points: u32) -> Self {
        self.max_points = Some(max_points);
        self
    }

    /// Parses a JSON object, rejecting unknown fields and wrong value shapes.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let query: Self = serde_json::from_value(value)?;
        query.validate()?;
        Ok(query)
    }

    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(HistorianError::Validation("at least one node is required".to_string()));
        }
        if let Some(blank) = self.nodes.iter().find(|n| n.trim().is_empty()) {
            return Err(HistorianError::Validation(format!("invalid node name '{}'", blank)));
        }
        validate_window(self.start, self.end)?;
        if self.max_points == Some(0) {
            return Err(HistorianError::Validation("maxPoints must be greater than zero".to_string()));
        }
        Ok(())
    }

    /// Node names without duplicates, first occurrence order.
    pub(crate) fn distinct_nodes(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.nodes.iter().filter(|n| seen.insert(n.as_str())).cloned().collect()
    }
}

/// Filter for event queries and event counts.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EventQuery {
    pub start: f64,
    pub end: f64,
    /// Only events from these senders; empty means every sender.
    #[serde(default)]
    pub senders: Vec<String>,
    /// Only events with these codes; empty means every code.
    #[serde(default)]
    pub codes: Vec<u32>,
    /// Every bit of the mask must be set in the event status.
    #[serde(default)]
    pub status_mask: Option<u32>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl EventQuery {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end, ..Default::default() }
    }

    pub fn with_senders<I, S>(mut self, senders: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.senders = senders.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_codes(mut self, codes: Vec<u32>) -> Self {
        self.codes = codes;
        self
    }

    pub fn with_status_mask(mut self, mask: u32) -> Self {
        self.status_mask = Some(mask);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Parses a JSON object, rejecting unknown fields and wrong value shapes.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        let query: Self = serde_json::from_value(value)?;
        query.validate()?;
        Ok(query)
    }

    pub fn validate(&self) -> Result<()> {
        validate_window(self.start, self.end)?;
        if let Some(blank) = self.senders.iter().find(|s| s.trim().is_empty()) {
            return Err(HistorianError::Validation(format!("invalid sender '{}'", blank)));
        }
        if self.limit == Some(0) {
            return Err(HistorianError::Validation("limit must be greater than zero".to_string()));
        }
        Ok(())
    }
}

fn validate_window(start: f64, end: f64) -> Result<()> {
    if !start.is_finite() || !end.is_finite() {
        return Err(HistorianError::Validation("start and end must be finite".to_string()));
    }
    if start > end {
        return Err(HistorianError::Validation(format!("start {} is after end {}", start, end)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_field_is_rejected() {
        let err = EventQuery::from_json(json!({"start": 1.0, "end": 2.0, "severity": 3})).unwrap_err();
        assert!(matches!(err, HistorianError::Validation(ref m) if m.contains("severity")));
    }

    #[test]
    fn test_wrong_shape_is_rejected() {
        let err = TimeseriesQuery::from_json(json!({"nodes": "pump", "start": 1.0, "end": 2.0})).unwrap_err();
        assert!(matches!(err, HistorianError::Validation(_)));
    }

    #[test]
    fn test_json_query_is_accepted() {
        let q = EventQuery::from_json(json!({
            "start": 10.0, "end": 20.0, "senders": ["A"], "statusMask": 4, "limit": 50
        }))
        .unwrap();
        assert_eq!(q.senders, vec!["A".to_string()]);
        assert_eq!(q.status_mask, Some(4));
        assert_eq!(q.limit, Some(50));
    }

    #[test]
    fn test_window_checks() {
        assert!(EventQuery::new(5.0, 1.0).validate().is_err());
        assert!(EventQuery::new(f64::NAN, 1.0).validate().is_err());
        assert!(EventQuery::new(1.0, 1.0).validate().is_ok());
        assert!(EventQuery::new(1.0, 2.0).with_limit(0).validate().is_err());
    }

    #[test]
    fn test_timeseries_checks() {
        assert!(TimeseriesQuery::new(Vec::<String>::new(), 0.0, 1.0).validate().is_err());
        assert!(TimeseriesQuery::new([" "], 0.0, 1.0).validate().is_err());
        assert!(TimeseriesQuery::new(["flow"], 0.0, 1.0).with_max_points(0).validate().is_err());
        assert!(TimeseriesQuery::new(["flow"], 0.0, 1.0).validate().is_ok());
    }

    #[test]
    fn test_distinct_nodes_keeps_order() {
        let q = TimeseriesQuery::new(["b", "a", "b", "c", "a"], 0.0, 1.0);
        assert_eq!(q.distinct_nodes(), vec!["b", "a", "c"]);
    }
}
