use super::StageContext;
use crate::error::{AgentError, Result};
use crate::llm::{invoke_structured, strip_code_fences};
use crate::prompts::sql_generation_prompt;
use crate::responses::SqlGenerationResponse;
use crate::state::QuerySessionState;
use tracing::info;

/// Turn the question into SQL. The first generation is attempt 1 of the
/// shared retry counter.
pub async fn run(ctx: &StageContext, mut state: QuerySessionState) -> Result<QuerySessionState> {
    let prompt = sql_generation_prompt(&state.user_query, &ctx.schema);
    let response: SqlGenerationResponse = invoke_structured(ctx.model.as_ref(), &prompt)
        .await
        .map_err(|e| AgentError::Generation(e.to_string()))?;

    state.sql_query = strip_code_fences(&response.sql_query);
    state.retry_count += 1;

    info!("Generated SQL (attempt {}): {}", state.retry_count, state.sql_query);
    Ok(state)
}
