//! Analysis stage: turns the result dump into the user-facing answer.

use super::{retry_exhausted_message, StageContext};
use crate::error::{AgentError, Result};
use crate::llm::invoke_structured;
use crate::prompts::analysis_prompt;
use crate::responses::AnalysisResponse;
use crate::state::QuerySessionState;
use itertools::Itertools;
use tracing::{info, warn};

pub async fn run(ctx: &StageContext, mut state: QuerySessionState) -> Result<QuerySessionState> {
    // Reached with an error only when correction gave up.
    if state.has_error() {
        warn!("Analysis skipped, retries exhausted: {}", state.error_message);
        state.final_answer = retry_exhausted_message(state.retry_count, &state.error_message);
        state.needs_chart = false;
        return Ok(state);
    }

    let prompt = analysis_prompt(&state.user_query, &state.sql_query, &state.query_result);
    let response: AnalysisResponse = invoke_structured(ctx.model.as_ref(), &prompt)
        .await
        .map_err(|e| AgentError::Analysis(e.to_string()))?;

    state.final_answer = compose_answer(&response);
    state.needs_chart = response.needs_visualization;

    info!(
        "Analysis done: {} insight(s), chart hint={}",
        response.key_insights.len(),
        response.needs_visualization
    );
    Ok(state)
}

fn compose_answer(response: &AnalysisResponse) -> String {
    let insights = response
        .key_insights
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();
    if insights.is_empty() {
        return response.natural_language_answer.clone();
    }

    let numbered = insights
        .iter()
        .enumerate()
        .map(|(i, insight)| format!("{}. {}", i + 1, insight))
        .join("\n");
    format!("{}\n\n\n**Key Insights:**\n{}", response.natural_language_answer, numbered)
}
