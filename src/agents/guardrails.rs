use super::StageContext;
use crate::error::{AgentError, Result};
use crate::llm::invoke_structured;
use crate::prompts::guardrails_prompt;
use crate::responses::GuardrailsResponse;
use crate::state::QuerySessionState;
use tracing::info;

pub const GREETING_REPLY: &str = "Hello! How can I assist you with e-commerce data today?";

pub const OUT_OF_SCOPE_REPLY: &str = "I'm sorry, but your question is outside the scope of the e-commerce database I have access to. \
     Please ask something related to products, users, orders, inventory, or sales analytics.";

/// Classify the question. Greetings and out-of-scope questions get a fixed
/// reply in `final_answer`, which ends the turn.
pub async fn run(ctx: &StageContext, mut state: QuerySessionState) -> Result<QuerySessionState> {
    let prompt = guardrails_prompt(&state.user_query);
    let verdict: GuardrailsResponse = invoke_structured(ctx.model.as_ref(), &prompt)
        .await
        .map_err(|e| AgentError::Classification(e.to_string()))?;

    info!(
        "Guardrails: relevant={} greeting={} ({})",
        verdict.is_question_relevant, verdict.is_greeting, verdict.reason
    );

    state.is_relevant = verdict.is_question_relevant;

    if verdict.is_greeting {
        state.final_answer = GREETING_REPLY.to_string();
        return Ok(state);
    }

    if !state.is_relevant {
        state.final_answer = OUT_OF_SCOPE_REPLY.to_string();
    }

    Ok(state)
}
