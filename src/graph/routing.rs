//! Routing predicates
//!
//! Every transition of the pipeline is a pure function of the state record
//! and the retry ceiling. `None` means the turn has reached its end.

use crate::state::{ChartType, QuerySessionState};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Guardrails,
    SqlGen,
    Execute,
    Correct,
    Analyze,
    VizDecide,
    VizGen,
}

impl Node {
    pub const ENTRY: Node = Node::Guardrails;

    pub fn name(&self) -> &'static str {
        match self {
            Node::Guardrails => "guardrails",
            Node::SqlGen => "sql_gen",
            Node::Execute => "execute",
            Node::Correct => "correct",
            Node::Analyze => "analyze",
            Node::VizDecide => "viz_decide",
            Node::VizGen => "viz_gen",
        }
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub fn after_guardrails(state: &QuerySessionState) -> Option<Node> {
    if !state.final_answer.is_empty() {
        return None;
    }
    if state.is_relevant {
        Some(Node::SqlGen)
    } else {
        None
    }
}

pub fn after_execute(state: &QuerySessionState, ceiling: u32) -> Option<Node> {
    if !state.has_error() || state.retry_count > ceiling {
        Some(Node::Analyze)
    } else {
        Some(Node::Correct)
    }
}

/// Back to execution with the corrected SQL, unless correction declined
/// because the attempt budget was already spent.
pub fn after_correct(state: &QuerySessionState, ceiling: u32) -> Option<Node> {
    if state.has_error() && state.retry_count > ceiling {
        Some(Node::Analyze)
    } else {
        Some(Node::Execute)
    }
}

pub fn after_viz_decide(state: &QuerySessionState) -> Option<Node> {
    if state.needs_chart && state.chart_type != ChartType::None {
        Some(Node::VizGen)
    } else {
        None
    }
}

/// Successor of `node` given the state it just produced.
pub fn next_node(node: Node, state: &QuerySessionState, ceiling: u32) -> Option<Node> {
    match node {
        Node::Guardrails => after_guardrails(state),
        Node::SqlGen => Some(Node::Execute),
        Node::Execute => after_execute(state, ceiling),
        Node::Correct => after_correct(state, ceiling),
        Node::Analyze => Some(Node::VizDecide),
        Node::VizDecide => after_viz_decide(state),
        Node::VizGen => None,
    }
}
