//! Chart generation stage
//!
//! The model only describes the chart (columns, title, labels); the figure
//! itself is built by `ChartRenderer` from the rows already in the state.
//! Any failure here drops the chart and keeps the answer.

use super::StageContext;
use crate::chart::{ChartRenderer, ChartSpec};
use crate::error::Result;
use crate::llm::invoke_structured;
use crate::prompts::chart_spec_prompt;
use crate::state::QuerySessionState;
use tracing::{info, warn};

pub async fn run(ctx: &StageContext, mut state: QuerySessionState) -> Result<QuerySessionState> {
    match build_chart(ctx, &state).await {
        Ok(figure) => {
            info!("Chart generated ({} bytes)", figure.len());
            state.chart_spec_json = figure;
        }
        Err(e) => {
            warn!("Chart generation failed, answer kept without chart: {}", e);
            state.chart_spec_json.clear();
            state.needs_chart = false;
        }
    }
    Ok(state)
}

async fn build_chart(ctx: &StageContext, state: &QuerySessionState) -> Result<String> {
    let table = ChartRenderer::pick_table(&state.result_tables)?;
    let max_points = ctx.settings.chart_max_points;
    let prompt = chart_spec_prompt(
        &state.user_query,
        &state.query_result,
        state.chart_type,
        &table.columns,
        max_points,
    );

    let mut spec: ChartSpec = invoke_structured(ctx.model.as_ref(), &prompt).await?;
    spec.chart_type = state.chart_type;

    let figure = ChartRenderer::new(max_points).render(&spec, table)?;
    Ok(serde_json::to_string(&figure)?)
}
