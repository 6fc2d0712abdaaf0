//! Wire and request types for the fitness data provider.
//!
//! Payload shapes follow the Google Fit REST API: int64 values are usually
//! encoded as JSON strings, point values are positional and are addressed by
//! field name through the [`DataType`] registry.

use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{FitError, TimeWindow};

/// Application package of the platform's own merged and derived streams.
pub const PLATFORM_PACKAGE: &str = "com.google.android.gms";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldFormat {
    Int,
    Float,
    String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Field {
    pub name: &'static str,
    pub format: FieldFormat,
}

impl Field {
    pub const BPM: Field = Field {
        name: "bpm",
        format: FieldFormat::Float,
    };
    pub const STEPS: Field = Field {
        name: "steps",
        format: FieldFormat::Int,
    };
    pub const AVERAGE: Field = Field {
        name: "average",
        format: FieldFormat::Float,
    };
    pub const MAX: Field = Field {
        name: "max",
        format: FieldFormat::Float,
    };
    pub const MIN: Field = Field {
        name: "min",
        format: FieldFormat::Float,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DataType {
    pub name: &'static str,
    pub fields: &'static [Field],
    /// OAuth scope area guarding this type (`fitness.<area>.read`).
    pub scope_area: &'static str,
    /// Stream name of the platform's merged source, when one exists.
    pub merge_stream: Option<&'static str>,
}

impl DataType {
    pub const HEART_RATE_BPM: DataType = DataType {
        name: "com.google.heart_rate.bpm",
        fields: &[Field::BPM],
        scope_area: "heart_rate",
        merge_stream: Some("merge_heart_rate_bpm"),
    };
    pub const STEP_COUNT_DELTA: DataType = DataType {
        name: "com.google.step_count.delta",
        fields: &[Field::STEPS],
        scope_area: "activity",
        merge_stream: Some("merge_step_deltas"),
    };
    /// Aggregated step deltas share the wire name of the raw type.
    pub const AGGREGATE_STEP_COUNT_DELTA: DataType = DataType {
        name: "com.google.step_count.delta",
        fields: &[Field::STEPS],
        scope_area: "activity",
        merge_stream: None,
    };
    pub const AGGREGATE_HEART_RATE_SUMMARY: DataType = DataType {
        name: "com.google.heart_rate.summary",
        fields: &[Field::AVERAGE, Field::MAX, Field::MIN],
        scope_area: "heart_rate",
        merge_stream: None,
    };

    const KNOWN: &'static [DataType] = &[
        DataType::HEART_RATE_BPM,
        DataType::STEP_COUNT_DELTA,
        DataType::AGGREGATE_HEART_RATE_SUMMARY,
    ];

    pub fn lookup(name: &str) -> Option<DataType> {
        Self::KNOWN.iter().copied().find(|t| t.name == name)
    }

    pub fn field_index(&self, field: &Field) -> Option<usize> {
        self.fields.iter().position(|f| f.name == field.name)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Value {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub int_val: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fp_val: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_val: Option<String>,
}

impl Value {
    pub fn int(v: i64) -> Self {
        Self {
            int_val: Some(v),
            ..Self::default()
        }
    }

    pub fn float(v: f64) -> Self {
        Self {
            fp_val: Some(v),
            ..Self::default()
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        self.int_val
    }

    /// Float view of the value; integer values widen.
    pub fn as_float(&self) -> Option<f64> {
        self.fp_val.or(self.int_val.map(|v| v as f64))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    #[serde(deserialize_with = "deserialize_i64_lenient")]
    pub start_time_nanos: i64,
    #[serde(deserialize_with = "deserialize_i64_lenient")]
    pub end_time_nanos: i64,
    pub data_type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin_data_source_id: Option<String>,
    #[serde(default, rename = "value")]
    pub values: Vec<Value>,
}

impl DataPoint {
    pub fn new(
        data_type: &DataType,
        start_millis: i64,
        end_millis: i64,
        values: Vec<Value>,
    ) -> Self {
        Self {
            start_time_nanos: start_millis.saturating_mul(1_000_000),
            end_time_nanos: end_millis.saturating_mul(1_000_000),
            data_type_name: data_type.name.to_string(),
            origin_data_source_id: None,
            values,
        }
    }

    pub fn start_millis(&self) -> i64 {
        self.start_time_nanos / 1_000_000
    }

    /// Value of `field`, resolved through the point's data type.
    pub fn value(&self, field: &Field) -> Option<&Value> {
        let index = DataType::lookup(&self.data_type_name)?.field_index(field)?;
        self.values.get(index)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSet {
    #[serde(default)]
    pub data_source_id: String,
    #[serde(default, rename = "point")]
    pub points: Vec<DataPoint>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct Bucket {
    #[serde(rename = "startTimeMillis", deserialize_with = "deserialize_i64_lenient")]
    pub start_millis: i64,
    #[serde(rename = "endTimeMillis", deserialize_with = "deserialize_i64_lenient")]
    pub end_millis: i64,
    #[serde(default, rename = "dataset")]
    pub data_sets: Vec<DataSet>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(default)]
    pub package_name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "startTimeMillis", deserialize_with = "deserialize_i64_lenient")]
    pub start_millis: i64,
    #[serde(rename = "endTimeMillis", deserialize_with = "deserialize_i64_lenient")]
    pub end_millis: i64,
    #[serde(default)]
    pub application: Option<Application>,
    #[serde(default)]
    pub activity_type: Option<i32>,
}

impl Session {
    pub fn package_name(&self) -> Option<&str> {
        self.application.as_ref()?.package_name.as_deref()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DataSourceKind {
    Raw,
    Derived,
}

/// A provider stream, identified as `<kind>:<type>:<package>:<stream>`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DataSource {
    pub data_type: DataType,
    pub kind: DataSourceKind,
    pub app_package: String,
    pub stream_name: String,
}

impl DataSource {
    pub fn derived(
        data_type: DataType,
        app_package: impl Into<String>,
        stream_name: impl Into<String>,
    ) -> Self {
        Self {
            data_type,
            kind: DataSourceKind::Derived,
            app_package: app_package.into(),
            stream_name: stream_name.into(),
        }
    }

    /// The platform's estimated step stream, the usual source for daily totals.
    pub fn estimated_steps() -> Self {
        Self::derived(DataType::STEP_COUNT_DELTA, PLATFORM_PACKAGE, "estimated_steps")
    }

    /// The platform's merged stream for `data_type`.
    pub fn merged(data_type: DataType) -> Result<Self, FitError> {
        let stream = data_type.merge_stream.ok_or_else(|| {
            FitError::InvalidInput(format!("no merged stream for {}", data_type.name))
        })?;
        Ok(Self::derived(data_type, PLATFORM_PACKAGE, stream))
    }

    pub fn stream_id(&self) -> String {
        let kind = match self.kind {
            DataSourceKind::Raw => "raw",
            DataSourceKind::Derived => "derived",
        };
        format!(
            "{}:{}:{}:{}",
            kind, self.data_type.name, self.app_package, self.stream_name
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SessionReadRequest {
    pub window: TimeWindow,
    pub data_types: Vec<DataType>,
    /// Include sessions the platform recorded on its own (activity detection).
    pub include_sessions: bool,
    pub server_queries: bool,
    /// Read sessions written by any application, not only this one.
    pub all_apps: bool,
}

impl SessionReadRequest {
    pub fn builder(window: TimeWindow) -> SessionReadRequestBuilder {
        SessionReadRequestBuilder {
            request: SessionReadRequest {
                window,
                data_types: Vec::new(),
                include_sessions: false,
                server_queries: false,
                all_apps: false,
            },
        }
    }
}

pub struct SessionReadRequestBuilder {
    request: SessionReadRequest,
}

impl SessionReadRequestBuilder {
    pub fn include_activity_sessions(mut self) -> Self {
        self.request.include_sessions = true;
        self
    }

    pub fn enable_server_queries(mut self) -> Self {
        self.request.server_queries = true;
        self
    }

    pub fn read_sessions_from_all_apps(mut self) -> Self {
        self.request.all_apps = true;
        self
    }

    pub fn read(mut self, data_type: DataType) -> Self {
        self.request.data_types.push(data_type);
        self
    }

    pub fn build(self) -> Result<SessionReadRequest, FitError> {
        if self.request.data_types.is_empty() {
            return Err(FitError::InvalidInput(
                "session read needs at least one data type".into(),
            ));
        }
        Ok(self.request)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DataReadRequest {
    pub aggregate: DataSource,
    pub bucket_width: chrono::Duration,
    pub window: TimeWindow,
}

impl DataReadRequest {
    pub fn aggregate(
        source: DataSource,
        bucket_width: chrono::Duration,
        window: TimeWindow,
    ) -> Result<Self, FitError> {
        if bucket_width <= chrono::Duration::zero() {
            return Err(FitError::InvalidInput(format!(
                "bucket width must be positive, got {bucket_width}"
            )));
        }
        Ok(Self {
            aggregate: source,
            bucket_width,
            window,
        })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SessionReadResponse {
    pub sessions: Vec<Session>,
    /// Data sets keyed by session id.
    pub data_sets: HashMap<String, Vec<DataSet>>,
}

impl SessionReadResponse {
    pub fn data_sets_for(&self, session: &Session) -> &[DataSet] {
        self.data_sets
            .get(&session.id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct DataReadResponse {
    #[serde(default, rename = "bucket")]
    pub buckets: Vec<Bucket>,
}

impl DataReadResponse {
    /// All points across buckets and their data sets.
    pub fn data_points(&self) -> impl Iterator<Item = &DataPoint> {
        self.buckets
            .iter()
            .flat_map(|b| b.data_sets.iter())
            .flat_map(|ds| ds.points.iter())
    }
}

fn deserialize_i64_lenient<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("expected integer, got {n}"))),
        serde_json::Value::String(s) => s
            .parse()
            .map_err(|_| D::Error::custom(format!("expected integer string, got {s}"))),
        other => Err(D::Error::custom(format!(
            "expected string or number, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn point_values_resolve_by_field_name() {
        let payload = json!({
            "startTimeNanos": "1000000",
            "endTimeNanos": 2000000,
            "dataTypeName": "com.google.heart_rate.summary",
            "value": [{"fpVal": 71.5}, {"fpVal": 120.0}, {"fpVal": 55.0}]
        });
        let point: DataPoint = serde_json::from_value(payload).expect("point");
        assert_eq!(point.start_millis(), 1);
        assert_eq!(point.value(&Field::MAX).and_then(Value::as_float), Some(120.0));
        assert_eq!(point.value(&Field::MIN).and_then(Value::as_float), Some(55.0));
        assert!(point.value(&Field::STEPS).is_none());
    }

    #[test]
    fn unknown_data_type_has_no_addressable_fields() {
        let point = DataPoint {
            start_time_nanos: 0,
            end_time_nanos: 0,
            data_type_name: "com.example.custom".into(),
            origin_data_source_id: None,
            values: vec![Value::int(3)],
        };
        assert!(point.value(&Field::STEPS).is_none());
    }

    #[test]
    fn nanos_reject_non_numeric_payloads() {
        let payload = json!({
            "startTimeNanos": {"nested": true},
            "endTimeNanos": "0",
            "dataTypeName": "com.google.step_count.delta"
        });
        assert!(serde_json::from_value::<DataPoint>(payload).is_err());
    }

    #[test]
    fn int_values_widen_to_float_but_not_back() {
        assert_eq!(Value::int(7).as_float(), Some(7.0));
        assert_eq!(Value::float(7.0).as_int(), None);
    }

    #[test]
    fn estimated_steps_stream_id() {
        assert_eq!(
            DataSource::estimated_steps().stream_id(),
            "derived:com.google.step_count.delta:com.google.android.gms:estimated_steps"
        );
    }

    #[test]
    fn merged_source_requires_a_merge_stream() {
        let hr = DataSource::merged(DataType::HEART_RATE_BPM).expect("merged");
        assert_eq!(hr.stream_name, "merge_heart_rate_bpm");
        assert!(DataSource::merged(DataType::AGGREGATE_HEART_RATE_SUMMARY).is_err());
    }

    #[test]
    fn session_request_needs_a_data_type() {
        let epoch = chrono::DateTime::from_timestamp(0, 0).expect("epoch");
        let window = TimeWindow::new(epoch, epoch).expect("window");
        assert!(SessionReadRequest::builder(window).build().is_err());
        let req = SessionReadRequest::builder(window)
            .include_activity_sessions()
            .enable_server_queries()
            .read_sessions_from_all_apps()
            .read(DataType::HEART_RATE_BPM)
            .build()
            .expect("request");
        assert!(req.include_sessions && req.server_queries && req.all_apps);
    }

    #[test]
    fn history_response_flattens_points() {
        let payload = json!({
            "bucket": [
                {"startTimeMillis": "0", "endTimeMillis": "86400000", "dataset": [
                    {"dataSourceId": "a", "point": [
                        {"startTimeNanos": "0", "endTimeNanos": "1", "dataTypeName": "com.google.step_count.delta", "value": [{"intVal": 10}]}
                    ]}
                ]},
                {"startTimeMillis": "86400000", "endTimeMillis": "172800000", "dataset": [
                    {"dataSourceId": "a", "point": []},
                    {"dataSourceId": "b", "point": [
                        {"startTimeNanos": "2", "endTimeNanos": "3", "dataTypeName": "com.google.step_count.delta", "value": [{"intVal": 5}]},
                        {"startTimeNanos": "4", "endTimeNanos": "5", "dataTypeName": "com.google.step_count.delta", "value": [{"intVal": 6}]}
                    ]}
                ]}
            ]
        });
        let resp: DataReadResponse = serde_json::from_value(payload).expect("response");
        assert_eq!(resp.buckets.len(), 2);
        assert_eq!(resp.data_points().count(), 3);
    }
}
