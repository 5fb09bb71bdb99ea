//! Units of work dispatched through a [`TaskQueue`](crate::traits::TaskQueue).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pressroom_common::{Language, VariantItem, VariantKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    /// Fetch, generate source-language variants, fan out translations.
    ProcessDocument {
        url: String,
        ministry: String,
        /// Used when the page carries no dateline.
        #[serde(default)]
        published_at: Option<DateTime<Utc>>,
        #[serde(default)]
        origin_office: Option<String>,
    },
    /// Translate one text (and its title) and save it as a single item.
    TranslateText {
        job_id: Option<Uuid>,
        document_id: Uuid,
        language: Language,
        kind: VariantKind,
        text: String,
        title: Option<String>,
    },
    /// Save a list of items, translating each one when `translate` is set.
    TranslateBatch {
        job_id: Option<Uuid>,
        document_id: Uuid,
        language: Language,
        kind: VariantKind,
        items: Vec<VariantItem>,
        translate: bool,
    },
    /// Flip the document's readiness flag.
    Finalize { document_id: Uuid },
}

impl Task {
    pub fn process(url: impl Into<String>, ministry: impl Into<String>) -> Self {
        Task::ProcessDocument {
            url: url.into(),
            ministry: ministry.into(),
            published_at: None,
            origin_office: None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Task::ProcessDocument { .. } => "process_document",
            Task::TranslateText { .. } => "translate_text",
            Task::TranslateBatch { .. } => "translate_batch",
            Task::Finalize { .. } => "finalize",
        }
    }

    /// Fan-out group this task is a leaf of, if any.
    pub fn job_id(&self) -> Option<Uuid> {
        match self {
            Task::TranslateText { job_id, .. } | Task::TranslateBatch { job_id, .. } => *job_id,
            _ => None,
        }
    }

    pub fn document_id(&self) -> Option<Uuid> {
        match self {
            Task::ProcessDocument { .. } => None,
            Task::TranslateText { document_id, .. }
            | Task::TranslateBatch { document_id, .. }
            | Task::Finalize { document_id } => Some(*document_id),
        }
    }

    pub(crate) fn with_job(mut self, id: Uuid) -> Self {
        match &mut self {
            Task::TranslateText { job_id, .. } | Task::TranslateBatch { job_id, .. } => {
                *job_id = Some(id)
            }
            _ => {}
        }
        self
    }
}

/// Exponential retry for failed tasks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(5),
            factor: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            ..Self::default()
        }
    }

    /// Delay before retrying after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.initial_delay.mul_f64(self.factor.powi(exponent))
    }
}
