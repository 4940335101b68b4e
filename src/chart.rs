//! Declarative charts
//!
//! The model describes a chart in terms of result columns; `ChartRenderer`
//! turns that description into a Plotly-compatible figure. The renderer only
//! ever sees the rows returned by the execution stage.

use crate::error::{AgentError, Result};
use crate::state::{CellValue, ChartType, ResultTable};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    /// Echo of the decided type; any spelling is accepted and unknown values
    /// become `ChartType::None`.
    #[serde(default, deserialize_with = "lenient_chart_type")]
    pub chart_type: ChartType,
    pub title: String,
    pub x_column: String,
    #[serde(default)]
    pub y_columns: Vec<String>,
    #[serde(default)]
    pub x_label: Option<String>,
    #[serde(default)]
    pub y_label: Option<String>,
    #[serde(default)]
    pub hover_columns: Vec<String>,
    #[serde(default)]
    pub sort_descending: Option<bool>,
    #[serde(default)]
    pub max_points: Option<usize>,
}

fn lenient_chart_type<'de, D>(deserializer: D) -> std::result::Result<ChartType, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.map(|r| ChartType::from_model_output(&r)).unwrap_or_default())
}

/// Minimum similarity for matching a misspelled column name.
const COLUMN_MATCH_THRESHOLD: f64 = 0.8;

pub struct ChartRenderer {
    max_points: usize,
}

impl ChartRenderer {
    pub fn new(max_points: usize) -> Self {
        Self {
            max_points: max_points.max(1),
        }
    }

    /// Choose the table a chart should be drawn from: the first one with rows.
    pub fn pick_table(tables: &[ResultTable]) -> Result<&ResultTable> {
        tables
            .iter()
            .find(|t| !t.is_empty() && !t.columns.is_empty())
            .ok_or_else(|| AgentError::Chart("no tabular data to chart".to_string()))
    }

    /// Interpret `spec` over `table` and return the figure JSON.
    pub fn render(&self, spec: &ChartSpec, table: &ResultTable) -> Result<Value> {
        if spec.chart_type == ChartType::None {
            return Err(AgentError::Chart("chart type 'none' cannot be rendered".to_string()));
        }

        let x_idx = resolve_column(table, &spec.x_column)?;
        let y_indices: Vec<usize> = if spec.y_columns.is_empty() {
            vec![first_numeric_column(table, x_idx)?]
        } else {
            spec.y_columns
                .iter()
                .map(|c| resolve_column(table, c))
                .collect::<Result<_>>()?
        };
        let hover_indices: Vec<usize> = spec
            .hover_columns
            .iter()
            .filter_map(|c| resolve_column(table, c).ok())
            .collect();

        let mut rows: Vec<&Vec<CellValue>> = table.rows.iter().collect();
        if spec.sort_descending.unwrap_or(false) {
            let key = y_indices[0];
            rows.sort_by(|a, b| {
                let a = a.get(key).and_then(CellValue::as_f64).unwrap_or(f64::MIN);
                let b = b.get(key).and_then(CellValue::as_f64).unwrap_or(f64::MIN);
                b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        let limit = spec.max_points.unwrap_or(self.max_points).clamp(1, self.max_points);
        rows.truncate(limit);

        let x_values: Vec<Value> = rows
            .iter()
            .map(|r| r.get(x_idx).map(CellValue::to_json).unwrap_or(Value::Null))
            .collect();
        let hover_text: Option<Vec<String>> = if hover_indices.is_empty() {
            None
        } else {
            Some(
                rows.iter()
                    .map(|r| {
                        hover_indices
                            .iter()
                            .map(|&i| {
                                let value = r.get(i).map(|c| c.to_string()).unwrap_or_default();
                                format!("{}: {}", table.columns[i], value)
                            })
                            .collect::<Vec<_>>()
                            .join("<br>")
                    })
                    .collect(),
            )
        };

        let mut traces = Vec::with_capacity(y_indices.len());
        for &y_idx in &y_indices {
            let y_values = numeric_series(&rows, y_idx, &table.columns[y_idx])?;
            traces.push(self.trace(spec.chart_type, &table.columns[y_idx], &x_values, y_values, hover_text.as_ref()));
            if spec.chart_type == ChartType::Pie {
                break;
            }
        }

        let x_title = spec.x_label.clone().unwrap_or_else(|| table.columns[x_idx].clone());
        let y_title = spec
            .y_label
            .clone()
            .unwrap_or_else(|| table.columns[y_indices[0]].clone());

        let mut layout = json!({
            "title": {"text": spec.title},
            "showlegend": spec.chart_type == ChartType::Pie || traces.len() > 1,
        });
        if spec.chart_type != ChartType::Pie {
            layout["xaxis"] = json!({"title": {"text": x_title}});
            layout["yaxis"] = json!({"title": {"text": y_title}});
        }

        Ok(json!({"data": traces, "layout": layout}))
    }

    fn trace(
        &self,
        chart_type: ChartType,
        name: &str,
        x: &[Value],
        y: Vec<Value>,
        hover: Option<&Vec<String>>,
    ) -> Value {
        let mut trace = match chart_type {
            ChartType::Pie => json!({"type": "pie", "labels": x, "values": y, "name": name}),
            ChartType::Line => json!({"type": "scatter", "mode": "lines+markers", "x": x, "y": y, "name": name}),
            ChartType::Scatter => json!({"type": "scatter", "mode": "markers", "x": x, "y": y, "name": name}),
            ChartType::Bar | ChartType::None => json!({"type": "bar", "x": x, "y": y, "name": name}),
        };
        match hover {
            Some(text) => {
                trace["text"] = json!(text);
                trace["hovertemplate"] = json!("%{text}<extra></extra>");
            }
            None => {
                trace["hoverinfo"] = json!(if chart_type == ChartType::Pie { "label+value+percent" } else { "x+y" });
            }
        }
        trace
    }
}

fn resolve_column(table: &ResultTable, requested: &str) -> Result<usize> {
    if let Some(idx) = table.column_index(requested) {
        return Ok(idx);
    }
    if let Some(idx) = table
        .columns
        .iter()
        .position(|c| c.eq_ignore_ascii_case(requested.trim()))
    {
        return Ok(idx);
    }

    let wanted = requested.trim().to_lowercase();
    table
        .columns
        .iter()
        .enumerate()
        .map(|(idx, c)| (idx, strsim::jaro_winkler(&c.to_lowercase(), &wanted)))
        .filter(|(_, score)| *score >= COLUMN_MATCH_THRESHOLD)
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(idx, _)| idx)
        .ok_or_else(|| {
            AgentError::Chart(format!(
                "column '{}' not in result (available: {})",
                requested,
                table.columns.join(", ")
            ))
        })
}

fn first_numeric_column(table: &ResultTable, skip: usize) -> Result<usize> {
    (0..table.columns.len())
        .filter(|&idx| idx != skip)
        .find(|&idx| table.rows.iter().all(|r| r.get(idx).map_or(true, |c| c.as_f64().is_some() || *c == CellValue::Null)))
        .ok_or_else(|| AgentError::Chart("no numeric column to plot".to_string()))
}

fn numeric_series(rows: &[&Vec<CellValue>], idx: usize, name: &str) -> Result<Vec<Value>> {
    let mut out = Vec::with_capacity(rows.len());
    let mut seen_number = false;
    for row in rows {
        match row.get(idx) {
            Some(CellValue::Null) | None => out.push(Value::Null),
            Some(cell) => {
                let value = cell
                    .as_f64()
                    .ok_or_else(|| AgentError::Chart(format!("column '{}' is not numeric ('{}')", name, cell)))?;
                seen_number = true;
                out.push(json!(value));
            }
        }
    }
    if !seen_number {
        return Err(AgentError::Chart(format!("column '{}' has no values", name)));
    }
    Ok(out)
}
