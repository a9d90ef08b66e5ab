//! Usage analytics aggregation
//!
//! A read-side reducer over one user's analytics entries. Pure: the
//! gateway fetches the rows, `summarize` folds them, nothing here
//! touches the database.

use crate::db::models::AnalyticsEntry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-model request count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub name: String,
    pub count: u64,
}

/// How often each feature toggle was active
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureUsage {
    pub evaluate_sources: u64,
    pub use_reranker: u64,
    pub use_multi_query: u64,
    pub use_streaming: u64,
}

/// Requests per UTC day, date formatted `YYYY-MM-DD`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCount {
    pub date: String,
    pub count: u64,
}

/// Aggregate over one user's full analytics history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    pub total_messages: u64,
    pub model_usage: Vec<ModelUsage>,
    pub feature_usage: FeatureUsage,
    pub consumption_over_time: Vec<DailyCount>,
    pub avg_cost_per_req: f64,
    pub avg_prompt_tokens_per_req: f64,
    pub avg_completion_tokens_per_req: f64,
    pub avg_total_tokens_per_req: f64,
    pub total_cost: f64,
    pub total_tokens: i64,
}

/// Fold a user's entries (ordered created_at ascending) into a summary.
///
/// Sums accumulate every non-null value, but the shared averaging
/// denominator counts only entries with a non-null total_tokens, so
/// entries that never completed a token-producing exchange do not
/// dilute the averages. Averages are 0.0 when that denominator is 0.
pub fn summarize(entries: &[AnalyticsEntry]) -> UsageSummary {
    let mut model_usage: BTreeMap<&str, u64> = BTreeMap::new();
    let mut feature_usage = FeatureUsage::default();
    let mut consumption: BTreeMap<String, u64> = BTreeMap::new();

    let mut total_cost = 0.0_f64;
    let mut total_prompt_tokens = 0_i64;
    let mut total_completion_tokens = 0_i64;
    let mut total_tokens = 0_i64;
    let mut entries_with_tokens = 0_u64;

    for entry in entries {
        *model_usage.entry(entry.model_used.as_str()).or_insert(0) += 1;

        if entry.evaluate_sources {
            feature_usage.evaluate_sources += 1;
        }
        if entry.use_reranker {
            feature_usage.use_reranker += 1;
        }
        if entry.use_multi_query {
            feature_usage.use_multi_query += 1;
        }
        if entry.was_streaming {
            feature_usage.use_streaming += 1;
        }

        let day = entry
            .created_at
            .with_timezone(&chrono::Utc)
            .format("%Y-%m-%d")
            .to_string();
        *consumption.entry(day).or_insert(0) += 1;

        if let Some(cost) = entry.cost {
            total_cost += cost;
        }
        if let Some(prompt) = entry.prompt_tokens {
            total_prompt_tokens += i64::from(prompt);
        }
        if let Some(completion) = entry.completion_tokens {
            total_completion_tokens += i64::from(completion);
        }
        if let Some(total) = entry.total_tokens {
            total_tokens += i64::from(total);
            entries_with_tokens += 1;
        }
    }

    let avg = |sum: f64| {
        if entries_with_tokens > 0 {
            sum / entries_with_tokens as f64
        } else {
            0.0
        }
    };

    UsageSummary {
        total_messages: entries.len() as u64,
        model_usage: model_usage
            .into_iter()
            .map(|(name, count)| ModelUsage {
                name: name.to_string(),
                count,
            })
            .collect(),
        feature_usage,
        consumption_over_time: consumption
            .into_iter()
            .map(|(date, count)| DailyCount { date, count })
            .collect(),
        avg_cost_per_req: avg(total_cost),
        avg_prompt_tokens_per_req: avg(total_prompt_tokens as f64),
        avg_completion_tokens_per_req: avg(total_completion_tokens as f64),
        avg_total_tokens_per_req: avg(total_tokens as f64),
        total_cost,
        total_tokens,
    }
}
