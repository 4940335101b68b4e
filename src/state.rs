//! Query session state
//!
//! One `QuerySessionState` is created per user turn and threaded by value
//! through every stage. Which stage may write which field is documented on
//! the field.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A single value read back from the data store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl CellValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Integer(i) => Some(*i as f64),
            CellValue::Real(f) => Some(*f),
            CellValue::Text(s) => s.trim().parse::<f64>().ok(),
            CellValue::Null => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            CellValue::Null => serde_json::Value::Null,
            CellValue::Integer(i) => serde_json::json!(i),
            CellValue::Real(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CellValue::Text(s) => serde_json::json!(s),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "None"),
            CellValue::Integer(i) => write!(f, "{}", i),
            CellValue::Real(v) => write!(f, "{}", v),
            CellValue::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Rows produced by one statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultTable {
    pub statement: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
}

impl ResultTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Scatter,
    #[default]
    None,
}

impl ChartType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
            ChartType::Scatter => "scatter",
            ChartType::None => "none",
        }
    }

    /// Lenient parse of what a model returns; anything unknown means no chart.
    pub fn from_model_output(raw: &str) -> Self {
        raw.parse().unwrap_or(ChartType::None)
    }
}

impl FromStr for ChartType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bar" | "bar chart" => Ok(ChartType::Bar),
            "line" | "line chart" => Ok(ChartType::Line),
            "pie" | "pie chart" => Ok(ChartType::Pie),
            "scatter" | "scatter plot" => Ok(ChartType::Scatter),
            "none" | "" => Ok(ChartType::None),
            other => Err(format!("unknown chart type '{}'", other)),
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QuerySessionState {
    /// Original question; never rewritten.
    pub user_query: String,
    /// Written by guardrails only.
    pub is_relevant: bool,
    /// Written by SQL generation and error correction only.
    pub sql_query: String,
    /// Written by execution on success, cleared on failure.
    pub query_result: String,
    /// Typed copy of the execution output; same lifecycle as `query_result`.
    #[serde(skip)]
    pub result_tables: Vec<ResultTable>,
    pub final_answer: String,
    /// Non-empty value triggers the correction loop.
    pub error_message: String,
    /// Attempt number; the first generation counts as attempt 1.
    pub retry_count: u32,
    pub needs_chart: bool,
    pub chart_type: ChartType,
    pub chart_spec_json: String,
}

impl QuerySessionState {
    pub fn new(user_query: impl Into<String>) -> Self {
        Self {
            user_query: user_query.into(),
            ..Self::default()
        }
    }

    pub fn has_error(&self) -> bool {
        !self.error_message.is_empty()
    }

    pub fn into_final(self) -> FinalState {
        FinalState::from(self)
    }
}

/// What a turn hands back to its caller.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FinalState {
    pub user_query: String,
    pub is_relevant: bool,
    pub sql_query: String,
    pub query_result: String,
    pub final_answer: String,
    pub error_message: String,
    pub retry_count: u32,
    pub needs_chart: bool,
    pub chart_type: ChartType,
    pub chart_spec_json: String,
}

impl From<QuerySessionState> for FinalState {
    fn from(state: QuerySessionState) -> Self {
        Self {
            user_query: state.user_query,
            is_relevant: state.is_relevant,
            sql_query: state.sql_query,
            query_result: state.query_result,
            final_answer: state.final_answer,
            error_message: state.error_message,
            retry_count: state.retry_count,
            needs_chart: state.needs_chart,
            chart_type: state.chart_type,
            chart_spec_json: state.chart_spec_json,
        }
    }
}
