//! Task genesis: turn a findings report into prioritized improvement tasks.

use mend_core::report::{CommonIssue, FeedbackAnalysis, FindingsReport, Sentiment, Severity};
use mend_core::{now_rfc3339, ImprovementTask, TaskCategory, TaskPriority, TaskSource};
use std::cmp::Ordering;

/// Derives improvement tasks from findings.
pub trait TaskPlanner: Send + Sync {
    /// Tasks sorted high priority first.
    fn plan(&self, report: &FindingsReport) -> Vec<ImprovementTask>;
}

/// Keyword-rule planner.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordTaskPlanner;

const ISSUE_RULES: &[(TaskCategory, &[&str])] = &[
    (
        TaskCategory::UiUx,
        &["ui", "ux", "design", "interface", "デザイン", "見た目", "使いにくい", "わかりにくい"],
    ),
    (
        TaskCategory::Voice,
        &["voice", "whisper", "stt", "microphone", "音声", "マイク", "録音"],
    ),
    (
        TaskCategory::Device,
        &["device", "mobile", "gps", "battery", "デバイス", "スマホ", "バッテリー"],
    ),
    (
        TaskCategory::Security,
        &["security", "vulnerability", "セキュリティ", "安全", "保護", "脆弱性"],
    ),
    (
        TaskCategory::Reasoning,
        &["error", "bug", "slow", "accuracy", "エラー", "バグ", "不具合", "問題", "遅い", "精度"],
    ),
];

const FEEDBACK_RULES: &[(TaskCategory, &[&str])] = &[
    (TaskCategory::UiUx, &["ui", "ux", "デザイン", "見た目"]),
    (TaskCategory::Voice, &["voice", "音声"]),
    (TaskCategory::Device, &["device", "デバイス"]),
    (TaskCategory::Security, &["security", "セキュリティ"]),
    (TaskCategory::Reasoning, &["bug", "error", "バグ", "エラー"]),
];

/// Error rate (percent) above which a stability task is raised.
const ERROR_RATE_THRESHOLD: f64 = 5.0;

fn classify(text: &str, rules: &[(TaskCategory, &[&str])]) -> TaskCategory {
    let lower = text.to_lowercase();
    rules
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(cat, _)| *cat)
        .unwrap_or(TaskCategory::Other)
}

/// Category for a common-issue keyword.
pub fn classify_issue(keyword: &str) -> TaskCategory {
    classify(keyword, ISSUE_RULES)
}

/// Category for a feedback category name.
pub fn classify_feedback(category: &str) -> TaskCategory {
    classify(category, FEEDBACK_RULES)
}

pub fn score_priority(issue: &CommonIssue) -> TaskPriority {
    if issue.severity == Severity::High || issue.frequency >= 5 {
        TaskPriority::High
    } else if issue.severity == Severity::Medium || issue.frequency >= 2 {
        TaskPriority::Medium
    } else {
        TaskPriority::Low
    }
}

/// High priority first; within a priority, newest first. Stable otherwise.
pub fn sort_by_priority(tasks: &mut [ImprovementTask]) {
    tasks.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| compare_timestamps(&b.created_at, &a.created_at))
    });
}

fn compare_timestamps(a: &str, b: &str) -> Ordering {
    let fmt = &time::format_description::well_known::Rfc3339;
    match (
        time::OffsetDateTime::parse(a, fmt),
        time::OffsetDateTime::parse(b, fmt),
    ) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

fn task_id(source: &str, label: &str) -> String {
    format!(
        "task_{source}_{}_{}",
        slug(label),
        ulid::Ulid::new().to_string().to_lowercase()
    )
}

/// Lowercase ASCII alphanumerics joined by `-`.
fn slug(label: &str) -> String {
    let mut out = String::new();
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('-') && !out.is_empty() {
            out.push('-');
        }
    }
    let trimmed = out.trim_end_matches('-');
    if trimmed.is_empty() {
        "item".into()
    } else {
        trimmed.to_string()
    }
}

fn issue_task(issue: &CommonIssue) -> ImprovementTask {
    let priority = score_priority(issue);
    let mut description = format!(
        "Issues mentioning \"{}\" were reported {} time(s).",
        issue.keyword, issue.frequency
    );
    if let Some(example) = issue.related_feedbacks.first() {
        description.push(' ');
        description.push_str(example);
    }
    ImprovementTask {
        id: task_id("issue", &issue.keyword),
        title: format!("Improve {}", issue.keyword),
        description,
        category: classify_issue(&issue.keyword),
        priority,
        source: TaskSource {
            source_type: "issue".into(),
            reference: format!(
                "frequency: {}, severity: {:?}",
                issue.frequency, issue.severity
            )
            .to_lowercase(),
        },
        estimated_effort: Some(priority.as_str().into()),
        created_at: now_rfc3339(),
    }
}

fn feedback_task(analysis: &FeedbackAnalysis) -> ImprovementTask {
    let priority = if analysis.count >= 5 {
        TaskPriority::High
    } else {
        TaskPriority::Medium
    };
    ImprovementTask {
        id: task_id("feedback", &analysis.category),
        title: format!("Improve the {} category", analysis.category),
        description: format!(
            "{} negative feedback item(s) in the {} category need review.",
            analysis.count, analysis.category
        ),
        category: classify_feedback(&analysis.category),
        priority,
        source: TaskSource {
            source_type: "feedback".into(),
            reference: format!("category: {}, count: {}", analysis.category, analysis.count),
        },
        estimated_effort: Some(if priority == TaskPriority::High { "high" } else { "medium" }.into()),
        created_at: now_rfc3339(),
    }
}

impl TaskPlanner for KeywordTaskPlanner {
    fn plan(&self, report: &FindingsReport) -> Vec<ImprovementTask> {
        let mut tasks: Vec<ImprovementTask> = report.common_issues.iter().map(issue_task).collect();

        tasks.extend(
            report
                .feedback_analysis
                .iter()
                .filter(|a| a.sentiment == Sentiment::Negative && a.count >= 2)
                .map(feedback_task),
        );

        let logs = &report.log_evaluation;
        if logs.error_rate > ERROR_RATE_THRESHOLD {
            tasks.push(ImprovementTask {
                id: task_id("log", "error-rate"),
                title: "Reduce chat error rate".into(),
                description: format!(
                    "The error rate is {:.1}%; stability needs work.",
                    logs.error_rate
                ),
                category: TaskCategory::Reasoning,
                priority: TaskPriority::High,
                source: TaskSource {
                    source_type: "log".into(),
                    reference: format!("error rate: {:.1}%", logs.error_rate),
                },
                estimated_effort: Some("medium".into()),
                created_at: now_rfc3339(),
            });
        }
        if logs.ambiguous_responses > 0 {
            tasks.push(ImprovementTask {
                id: task_id("log", "ambiguous"),
                title: "Reduce ambiguous responses".into(),
                description: format!(
                    "{} ambiguous response(s) detected; answer precision needs work.",
                    logs.ambiguous_responses
                ),
                category: TaskCategory::Reasoning,
                priority: TaskPriority::Medium,
                source: TaskSource {
                    source_type: "log".into(),
                    reference: format!("ambiguous responses: {}", logs.ambiguous_responses),
                },
                estimated_effort: Some("high".into()),
                created_at: now_rfc3339(),
            });
        }

        sort_by_priority(&mut tasks);
        tasks
    }
}
