//! Final usage/cost record of a translation run

use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::core::cost::CostBreakdown;
use crate::core::models::{ModelEntry, TargetLanguage, TranslationSummary};

/// Raw measurements collected by a completed run
#[derive(Debug, Clone)]
pub struct RunUsage<'a> {
    pub document_id: Uuid,
    pub model: &'a ModelEntry,
    pub target_language: TargetLanguage,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub page_count: u32,
    pub elapsed: Duration,
}

/// Turns run measurements into a [`TranslationSummary`] and logs it
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryReporter;

impl SummaryReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, usage: &RunUsage<'_>) -> TranslationSummary {
        let cost = CostBreakdown::for_usage(usage.model, usage.input_tokens, usage.output_tokens);

        TranslationSummary {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost: cost.reported_total(),
            duration_ms: usage.elapsed.as_millis() as u64,
            page_count: usage.page_count,
            model_label: usage.model.label.clone(),
            target_language: usage.target_language,
        }
    }

    /// Build the summary and hand it to the log
    pub fn report(&self, usage: &RunUsage<'_>) -> TranslationSummary {
        let summary = self.build(usage);

        info!(
            document_id = %usage.document_id,
            model_id = %usage.model.id,
            input_tokens = summary.input_tokens,
            output_tokens = summary.output_tokens,
            cost = summary.cost,
            duration_ms = summary.duration_ms,
            pages = summary.page_count,
            model = %summary.model_label,
            target_language = %summary.target_language,
            "translation completed"
        );

        summary
    }
}
