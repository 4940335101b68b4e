//! Structured outputs requested from the model, one per stage.

use crate::chart::ChartSpec;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Field set a stage asks the model to fill in.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseShape {
    pub name: &'static str,
    pub description: &'static str,
    pub schema: serde_json::Value,
}

pub trait StructuredResponse: DeserializeOwned {
    fn shape() -> ResponseShape;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardrailsResponse {
    pub is_question_relevant: bool,
    pub is_greeting: bool,
    #[serde(default)]
    pub reason: String,
}

impl StructuredResponse for GuardrailsResponse {
    fn shape() -> ResponseShape {
        ResponseShape {
            name: "classify_question",
            description: "Classify whether the question can be answered from the e-commerce database.",
            schema: json!({
                "type": "object",
                "properties": {
                    "is_question_relevant": {"type": "boolean", "description": "True if the question is answerable from the database."},
                    "is_greeting": {"type": "boolean", "description": "True if the message is a greeting."},
                    "reason": {"type": "string", "description": "Explanation for the classification."}
                },
                "required": ["is_question_relevant", "is_greeting", "reason"]
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlGenerationResponse {
    pub sql_query: String,
    #[serde(default)]
    pub explanation: String,
}

impl StructuredResponse for SqlGenerationResponse {
    fn shape() -> ResponseShape {
        ResponseShape {
            name: "generate_sql",
            description: "Return one executable SQLite query answering the question.",
            schema: json!({
                "type": "object",
                "properties": {
                    "sql_query": {"type": "string", "description": "The generated SQL query."},
                    "explanation": {"type": "string", "description": "What the query does, max 30 words."}
                },
                "required": ["sql_query", "explanation"]
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorCorrectionResponse {
    pub corrected_sql_query: String,
    #[serde(default)]
    pub error_analysis: String,
}

impl StructuredResponse for ErrorCorrectionResponse {
    fn shape() -> ResponseShape {
        ResponseShape {
            name: "correct_sql",
            description: "Return a corrected SQLite query that resolves the reported error.",
            schema: json!({
                "type": "object",
                "properties": {
                    "corrected_sql_query": {"type": "string", "description": "The fixed SQL query."},
                    "error_analysis": {"type": "string", "description": "What was wrong and how it was fixed, max 50 words."}
                },
                "required": ["corrected_sql_query", "error_analysis"]
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub natural_language_answer: String,
    #[serde(default)]
    pub key_insights: Vec<String>,
    #[serde(default)]
    pub needs_visualization: bool,
}

impl StructuredResponse for AnalysisResponse {
    fn shape() -> ResponseShape {
        ResponseShape {
            name: "analyze_results",
            description: "Explain query results in natural language.",
            schema: json!({
                "type": "object",
                "properties": {
                    "natural_language_answer": {"type": "string", "description": "Direct answer to the question."},
                    "key_insights": {"type": "array", "items": {"type": "string"}, "description": "2-3 key takeaways."},
                    "needs_visualization": {"type": "boolean", "description": "Whether a chart would help."}
                },
                "required": ["natural_language_answer", "key_insights", "needs_visualization"]
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualizationDecisionResponse {
    pub needs_visualization: bool,
    pub visualization_type: String,
    #[serde(default)]
    pub reasoning: String,
}

impl StructuredResponse for VisualizationDecisionResponse {
    fn shape() -> ResponseShape {
        ResponseShape {
            name: "decide_visualization",
            description: "Decide whether a chart adds value and which type.",
            schema: json!({
                "type": "object",
                "properties": {
                    "needs_visualization": {"type": "boolean"},
                    "visualization_type": {"type": "string", "enum": ["bar", "line", "pie", "scatter", "none"]},
                    "reasoning": {"type": "string", "description": "Max 30 words."}
                },
                "required": ["needs_visualization", "visualization_type", "reasoning"]
            }),
        }
    }
}

impl StructuredResponse for ChartSpec {
    fn shape() -> ResponseShape {
        ResponseShape {
            name: "build_chart",
            description: "Describe one chart over the columns of the query result.",
            schema: json!({
                "type": "object",
                "properties": {
                    "chart_type": {"type": "string", "enum": ["bar", "line", "pie", "scatter"]},
                    "title": {"type": "string"},
                    "x_column": {"type": "string", "description": "Result column for the x axis or pie labels."},
                    "y_columns": {"type": "array", "items": {"type": "string"}, "description": "Numeric result columns, one trace each."},
                    "x_label": {"type": "string"},
                    "y_label": {"type": "string"},
                    "hover_columns": {"type": "array", "items": {"type": "string"}},
                    "sort_descending": {"type": "boolean"},
                    "max_points": {"type": "integer", "minimum": 1}
                },
                "required": ["chart_type", "title", "x_column", "y_columns"]
            }),
        }
    }
}
