use serde::{Deserialize, Serialize};

/// Message carried by a successful stats query that had too little data.
pub const NOT_READY_MESSAGE: &str = "Calculating now";

/// Payload of the `hello` key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloResponse {
    pub message: String,
}

impl HelloResponse {
    pub fn ok() -> Self {
        Self { message: "OK".to_string() }
    }
}

/// Payload of the `stats` key.
///
/// `error` is empty when `metrics` holds a full result; otherwise it names
/// why no metrics were produced (e.g. [`NOT_READY_MESSAGE`]).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub metrics: Vec<Metric>,
}

impl StatsResponse {
    pub fn not_ready() -> Self {
        Self {
            error:   NOT_READY_MESSAGE.to_string(),
            metrics: Vec::new(),
        }
    }

    pub fn with_metrics(metrics: Vec<Metric>) -> Self {
        Self {
            error: String::new(),
            metrics,
        }
    }
}

/// One named statistic stamped with the query time (seconds since epoch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub key:    String,
    pub metric: f64,
    pub epoch:  i64,
}

impl Metric {
    pub fn new(key: impl Into<String>, metric: f64, epoch: i64) -> Self {
        Self {
            key: key.into(),
            metric,
            epoch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_ready_serializes_empty_metrics() {
        let json = serde_json::to_string(&StatsResponse::not_ready()).unwrap();
        assert_eq!(json, r#"{"error":"Calculating now","metrics":[]}"#);
    }

    #[test]
    fn metric_field_names_match_wire_format() {
        let res = StatsResponse::with_metrics(vec![Metric::new("max", 12.5, 1_700_000_000)]);
        let json = serde_json::to_string(&res).unwrap();
        assert_eq!(
            json,
            r#"{"error":"","metrics":[{"key":"max","metric":12.5,"epoch":1700000000}]}"#
        );
    }

    #[test]
    fn stats_tolerates_missing_fields() {
        let res: StatsResponse = serde_json::from_str("{}").unwrap();
        assert!(res.error.is_empty());
        assert!(res.metrics.is_empty());
    }

    #[test]
    fn hello_ok_message() {
        let json = serde_json::to_string(&HelloResponse::ok()).unwrap();
        assert_eq!(json, r#"{"message":"OK"}"#);
    }
}
