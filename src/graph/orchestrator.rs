//! Turn driver
//!
//! Walks the stage graph from guardrails to the end for one question,
//! emitting a started/completed event around every stage and exactly one
//! terminal event. Stages run strictly one at a time; the only loop
//! (execute/correct) is capped by the correction stage itself and, as a
//! second net, by the step ceiling enforced here.

use super::events::{dispatch, EventKind, EventSink, NoopSink, ProgressEvent};
use super::routing::{next_node, Node};
use crate::agents::{analyzer, error_corrector, guardrails, sql_executor, sql_generator, visualizer, viz_decision};
use crate::agents::StageContext;
use crate::config::{AppConfig, PipelineSettings};
use crate::db::{DataStore, SqliteStore};
use crate::error::{AgentError, Result};
use crate::llm::{LanguageModel, LlmClient};
use crate::state::{FinalState, QuerySessionState};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

const SUMMARY_PREVIEW_CHARS: usize = 120;

pub struct Orchestrator {
    ctx: StageContext,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn LanguageModel>, store: Arc<dyn DataStore>, settings: PipelineSettings) -> Self {
        Self {
            ctx: StageContext::new(model, store, settings),
        }
    }

    /// HTTP model client plus the SQLite store named by the configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        config.require_api_key()?;
        let model = LlmClient::new(config.llm.clone())?;
        let store = SqliteStore::new(&config.db_path);
        info!(
            "Orchestrator ready: model={} store={} ceiling={}",
            config.llm.model,
            store.describe(),
            config.pipeline.max_retry_attempts
        );
        Ok(Self::new(Arc::new(model), Arc::new(store), config.pipeline.clone()))
    }

    /// Swap the model backend, returning the previous one.
    pub fn replace_model(&mut self, model: Arc<dyn LanguageModel>) -> Arc<dyn LanguageModel> {
        info!("Model backend replaced: {} -> {}", self.ctx.model.name(), model.name());
        std::mem::replace(&mut self.ctx.model, model)
    }

    pub async fn run_turn(&self, user_query: &str) -> Result<FinalState> {
        self.run_turn_with_events(user_query, &NoopSink).await
    }

    pub async fn run_turn_with_events(&self, user_query: &str, sink: &dyn EventSink) -> Result<FinalState> {
        let turn_id = Uuid::new_v4();
        info!("Turn {} started: {}", turn_id, user_query);
        let started = Instant::now();

        match self.drive(turn_id, user_query, sink).await {
            Ok(state) => {
                let final_state = state.into_final();
                info!(
                    "Turn {} completed in {:?} (attempts: {}, chart: {})",
                    turn_id,
                    started.elapsed(),
                    final_state.retry_count,
                    final_state.chart_type
                );
                dispatch(
                    sink,
                    ProgressEvent::new(turn_id, EventKind::TurnCompleted { state: final_state.clone() }),
                );
                Ok(final_state)
            }
            Err(e) => {
                error!("Turn {} failed: {}", turn_id, e);
                dispatch(sink, ProgressEvent::new(turn_id, EventKind::TurnFailed { error: e.to_string() }));
                Err(e)
            }
        }
    }

    async fn drive(&self, turn_id: Uuid, user_query: &str, sink: &dyn EventSink) -> Result<QuerySessionState> {
        let ceiling = self.ctx.settings.max_retry_attempts;
        let max_steps = self.ctx.settings.max_steps;
        let mut state = QuerySessionState::new(user_query);
        let mut node = Some(Node::ENTRY);
        let mut steps = 0usize;

        while let Some(current) = node {
            if steps >= max_steps {
                return Err(AgentError::StepLimit(max_steps));
            }
            steps += 1;

            dispatch(sink, ProgressEvent::new(turn_id, EventKind::StageStarted { stage: current }));
            let stage_start = Instant::now();
            state = self.run_stage(current, state).await?;
            debug!("Stage {} finished in {:?}", current, stage_start.elapsed());

            dispatch(
                sink,
                ProgressEvent::new(
                    turn_id,
                    EventKind::StageCompleted {
                        stage: current,
                        summary: summarize(current, &state),
                    },
                ),
            );
            node = next_node(current, &state, ceiling);
        }

        Ok(state)
    }

    async fn run_stage(&self, node: Node, state: QuerySessionState) -> Result<QuerySessionState> {
        let ctx = &self.ctx;
        match node {
            Node::Guardrails => guardrails::run(ctx, state).await,
            Node::SqlGen => sql_generator::run(ctx, state).await,
            Node::Execute => sql_executor::run(ctx, state).await,
            Node::Correct => error_corrector::run(ctx, state).await,
            Node::Analyze => analyzer::run(ctx, state).await,
            Node::VizDecide => viz_decision::run(ctx, state).await,
            Node::VizGen => visualizer::run(ctx, state).await,
        }
    }
}

/// One-line description of what a stage produced, for progress displays.
fn summarize(node: Node, state: &QuerySessionState) -> String {
    match node {
        Node::Guardrails if state.final_answer.is_empty() => "question accepted".to_string(),
        Node::Guardrails => preview(&state.final_answer),
        Node::SqlGen | Node::Correct if state.has_error() => "correction declined, retries exhausted".to_string(),
        Node::SqlGen | Node::Correct => preview(&state.sql_query),
        Node::Execute if state.has_error() => preview(&state.error_message),
        Node::Execute => {
            let rows: usize = state.result_tables.iter().map(|t| t.rows.len()).sum();
            format!("{} statement(s), {} row(s)", state.result_tables.len(), rows)
        }
        Node::Analyze => preview(&state.final_answer),
        Node::VizDecide if state.needs_chart => format!("chart: {}", state.chart_type),
        Node::VizDecide => "no chart".to_string(),
        Node::VizGen if state.chart_spec_json.is_empty() => "chart dropped".to_string(),
        Node::VizGen => format!("{} chart generated", state.chart_type),
    }
}

fn preview(text: &str) -> String {
    let mut out: String = text.chars().take(SUMMARY_PREVIEW_CHARS).collect();
    if text.chars().count() > SUMMARY_PREVIEW_CHARS {
        out.push_str("...");
    }
    out
}
