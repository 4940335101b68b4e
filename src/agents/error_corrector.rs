use super::{retry_exhausted_message, StageContext};
use crate::error::{AgentError, Result};
use crate::llm::{invoke_structured, strip_code_fences};
use crate::prompts::error_correction_prompt;
use crate::responses::ErrorCorrectionResponse;
use crate::state::QuerySessionState;
use tracing::{info, warn};

/// Rewrite the failed SQL using the execution error. Once the attempt budget
/// is spent the stage writes the apology instead and leaves the error in
/// place so the graph can route to analysis.
pub async fn run(ctx: &StageContext, mut state: QuerySessionState) -> Result<QuerySessionState> {
    let ceiling = ctx.settings.max_retry_attempts;
    if state.retry_count > ceiling {
        warn!("Correction declined: {} attempts used (limit {})", state.retry_count, ceiling);
        state.final_answer = retry_exhausted_message(state.retry_count, &state.error_message);
        return Ok(state);
    }

    let prompt = error_correction_prompt(&state.user_query, &state.sql_query, &state.error_message, &ctx.schema);
    let response: ErrorCorrectionResponse = invoke_structured(ctx.model.as_ref(), &prompt)
        .await
        .map_err(|e| AgentError::Generation(e.to_string()))?;

    state.sql_query = strip_code_fences(&response.corrected_sql_query);
    state.error_message.clear();
    state.retry_count += 1;

    info!(
        "Corrected SQL (attempt {}): {} [{}]",
        state.retry_count, state.sql_query, response.error_analysis
    );
    Ok(state)
}
