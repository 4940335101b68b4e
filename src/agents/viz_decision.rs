use super::sql_executor::NO_RESULTS_MARKER;
use super::StageContext;
use crate::error::Result;
use crate::llm::invoke_structured;
use crate::prompts::visualization_decision_prompt;
use crate::responses::VisualizationDecisionResponse;
use crate::state::{ChartType, QuerySessionState};
use tracing::{info, warn};

/// True when there is nothing worth charting, so the model is not asked.
pub fn nothing_to_chart(state: &QuerySessionState) -> bool {
    state.query_result.trim().is_empty()
        || state.query_result.contains(NO_RESULTS_MARKER.trim_end_matches('.'))
        || state.has_error()
        || state.result_tables.iter().all(|t| t.is_empty())
}

/// Decide whether to draw a chart and of which type. A failed decision is
/// treated as "no chart" rather than failing the turn.
pub async fn run(ctx: &StageContext, mut state: QuerySessionState) -> Result<QuerySessionState> {
    if nothing_to_chart(&state) {
        state.needs_chart = false;
        state.chart_type = ChartType::None;
        return Ok(state);
    }

    let prompt = visualization_decision_prompt(&state.user_query, &state.query_result);
    match invoke_structured::<VisualizationDecisionResponse>(ctx.model.as_ref(), &prompt).await {
        Ok(decision) => {
            let chart_type = ChartType::from_model_output(&decision.visualization_type);
            state.needs_chart = decision.needs_visualization && chart_type != ChartType::None;
            state.chart_type = if state.needs_chart { chart_type } else { ChartType::None };
            info!(
                "Visualization decision: {} ({}) - {}",
                state.needs_chart, state.chart_type, decision.reasoning
            );
        }
        Err(e) => {
            warn!("Visualization decision failed, continuing without chart: {}", e);
            state.needs_chart = false;
            state.chart_type = ChartType::None;
        }
    }

    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::test_support::ScriptedModel;
    use crate::config::PipelineSettings;
    use crate::db::SqliteStore;
    use crate::state::{CellValue, ResultTable};
    use serde_json::json;
    use std::sync::Arc;

    fn ctx(model: Arc<ScriptedModel>) -> StageContext {
        StageContext::new(model, Arc::new(SqliteStore::new("unused.db")), PipelineSettings::default())
    }

    fn state_with_rows() -> QuerySessionState {
        let mut state = QuerySessionState::new("orders per month");
        state.query_result = "month    orders\n2024-01  10".into();
        state.result_tables = vec![ResultTable {
            statement: "SELECT ...".into(),
            columns: vec!["month".into(), "orders".into()],
            rows: vec![vec![CellValue::Text("2024-01".into()), CellValue::Integer(10)]],
        }];
        state.needs_chart = true;
        state
    }

    #[tokio::test]
    async fn test_empty_results_short_circuit() {
        let model = Arc::new(ScriptedModel::new());
        let mut state = QuerySessionState::new("q");
        state.query_result = NO_RESULTS_MARKER.into();
        state.needs_chart = true;
        let state = run(&ctx(model.clone()), state).await.unwrap();
        assert!(model.calls().is_empty());
        assert!(!state.needs_chart);
        assert_eq!(state.chart_type, ChartType::None);
    }

    #[tokio::test]
    async fn test_decision_is_adopted() {
        let model = Arc::new(ScriptedModel::new().reply(
            "decide_visualization",
            json!({"needs_visualization": true, "visualization_type": "line", "reasoning": "time series"}),
        ));
        let state = run(&ctx(model), state_with_rows()).await.unwrap();
        assert!(state.needs_chart);
        assert_eq!(state.chart_type, ChartType::Line);
    }

    #[tokio::test]
    async fn test_unknown_type_or_failure_means_no_chart() {
        let model = Arc::new(ScriptedModel::new().reply(
            "decide_visualization",
            json!({"needs_visualization": true, "visualization_type": "heatmap", "reasoning": ""}),
        ));
        let state = run(&ctx(model), state_with_rows()).await.unwrap();
        assert!(!state.needs_chart);

        let state = run(&ctx(Arc::new(ScriptedModel::new())), state_with_rows()).await.unwrap();
        assert!(!state.needs_chart);
        assert_eq!(state.chart_type, ChartType::None);
    }
}
