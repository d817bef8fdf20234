//! Folding inbound events into a turn result.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::frame::BackendError;

/// Terminal status of a turn's result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TurnStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

/// Aggregated outcome of one turn.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChatResult {
    /// Content fragments in arrival order.
    pub content: Vec<String>,
    pub metadata: BTreeMap<String, String>,
    pub status: TurnStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<BackendError>,
}

impl ChatResult {
    /// All fragments joined.
    pub fn text(&self) -> String {
        self.content.concat()
    }

    pub fn is_completed(&self) -> bool {
        self.status == TurnStatus::Completed
    }
}

/// Mutable result under construction. Only the collector holds one.
#[derive(Debug, Default)]
pub struct ResultAccumulator {
    result: ChatResult,
}

impl ResultAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_content(&mut self, fragment: String) {
        self.result.content.push(fragment);
    }

    pub fn upsert_metadata(&mut self, entries: Vec<(String, String)>) {
        self.result.metadata.extend(entries);
    }

    pub fn complete(&mut self) {
        self.result.status = TurnStatus::Completed;
    }

    pub fn fail(&mut self, error: Option<BackendError>) {
        self.result.status = TurnStatus::Failed;
        self.result.error = error;
    }

    pub const fn fragment_count(&self) -> usize {
        self.result.content.len()
    }

    pub fn finish(self) -> ChatResult {
        self.result
    }
}
