//! Findings produced by the diagnostic layer. Opaque to the pipeline apart
//! from what task genesis reads.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackAnalysis {
    pub category: String,
    pub count: u32,
    #[serde(default)]
    pub percentage: f64,
    #[serde(default)]
    pub common_keywords: Vec<String>,
    #[serde(default)]
    pub sentiment: Sentiment,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommonIssue {
    pub keyword: String,
    pub frequency: u32,
    #[serde(default)]
    pub related_feedbacks: Vec<String>,
    #[serde(default)]
    pub severity: Severity,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct LogEvaluation {
    #[serde(default)]
    pub total_messages: u64,
    #[serde(default)]
    pub ambiguous_responses: u64,
    /// Percentage, 0–100.
    #[serde(default)]
    pub error_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct FindingsReport {
    pub generated_at: String,
    #[serde(default)]
    pub feedback_analysis: Vec<FeedbackAnalysis>,
    #[serde(default)]
    pub common_issues: Vec<CommonIssue>,
    #[serde(default)]
    pub log_evaluation: LogEvaluation,
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
    #[serde(default)]
    pub summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_report_parses_with_defaults() {
        let r: FindingsReport =
            serde_json::from_str(r#"{"generated_at":"2026-01-01T00:00:00Z"}"#).unwrap();
        assert!(r.common_issues.is_empty());
        assert_eq!(r.log_evaluation.error_rate, 0.0);
    }

    #[test]
    fn issue_severity_parses() {
        let r: FindingsReport = serde_json::from_str(
            r#"{"generated_at":"x","common_issues":[{"keyword":"layout","frequency":3,"severity":"high"}]}"#,
        )
        .unwrap();
        assert_eq!(r.common_issues[0].severity, Severity::High);
    }
}
