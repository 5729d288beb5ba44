//! Which tasks are mechanical enough to fix without a human.

use crate::catalog::PatchGenerator;
use mend_core::{now_rfc3339, ImprovementTask, Patch, TaskCategory};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutoFixableTask {
    pub task: ImprovementTask,
    #[serde(default)]
    pub patches: Vec<Patch>,
    pub auto_fixable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutoFixSummary {
    pub total_tasks: usize,
    pub auto_fixable_count: usize,
    /// Every patch generated for the auto-fixable tasks, in task order.
    pub patches: Vec<Patch>,
    /// Auto-fixable tasks only.
    pub tasks: Vec<AutoFixableTask>,
    pub generated_at: String,
}

fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|w| text.contains(w))
}

/// `Ok(())` if the task can be auto-fixed, otherwise the reason it can't.
pub fn check_auto_fixable(task: &ImprovementTask) -> Result<(), String> {
    let (title, desc) = task.search_text();
    let fixable = match task.category {
        TaskCategory::UiUx => {
            contains_any(
                &title,
                &["color", "色", "style", "スタイル", "layout", "レイアウト", "position", "配置"],
            ) || contains_any(&desc, &["color", "色"])
        }
        TaskCategory::Reasoning => {
            contains_any(&title, &["error", "エラー"]) || contains_any(&desc, &["error", "エラー"])
        }
        TaskCategory::Voice => contains_any(&title, &["ui", "display", "表示", "button", "ボタン"]),
        _ => false,
    };
    if fixable {
        Ok(())
    } else {
        Err(format!("{} tasks need manual attention", task.category.as_str()))
    }
}

/// Classify every task, generating patches for the fixable ones.
pub fn identify(tasks: &[ImprovementTask], generator: &dyn PatchGenerator) -> Vec<AutoFixableTask> {
    tasks
        .iter()
        .map(|task| match check_auto_fixable(task) {
            Ok(()) => AutoFixableTask {
                patches: generator.generate(task),
                task: task.clone(),
                auto_fixable: true,
                reason: None,
            },
            Err(reason) => AutoFixableTask {
                task: task.clone(),
                patches: Vec::new(),
                auto_fixable: false,
                reason: Some(reason),
            },
        })
        .collect()
}

pub fn summarize(classified: Vec<AutoFixableTask>) -> AutoFixSummary {
    let total_tasks = classified.len();
    let tasks: Vec<AutoFixableTask> = classified.into_iter().filter(|t| t.auto_fixable).collect();
    AutoFixSummary {
        total_tasks,
        auto_fixable_count: tasks.len(),
        patches: tasks.iter().flat_map(|t| t.patches.iter().cloned()).collect(),
        tasks,
        generated_at: now_rfc3339(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogPatchGenerator, PatchTemplate};
    use mend_core::{RiskLevel, TaskPriority, TaskSource};

    fn task(id: &str, category: TaskCategory, title: &str, desc: &str) -> ImprovementTask {
        ImprovementTask {
            id: id.into(),
            title: title.into(),
            description: desc.into(),
            category,
            priority: TaskPriority::Medium,
            source: TaskSource {
                source_type: "issue".into(),
                reference: String::new(),
            },
            estimated_effort: None,
            created_at: "2026-01-01T00:00:00Z".into(),
        }
    }

    #[test]
    fn category_rules() {
        assert!(check_auto_fixable(&task("a", TaskCategory::UiUx, "Button Color", "")).is_ok());
        assert!(check_auto_fixable(&task("a", TaskCategory::UiUx, "Header", "wrong color")).is_ok());
        // style and layout only count in the title
        assert!(check_auto_fixable(&task("a", TaskCategory::UiUx, "Header", "bad layout")).is_err());
        assert!(check_auto_fixable(&task("a", TaskCategory::Reasoning, "x", "Error rate")).is_ok());
        assert!(check_auto_fixable(&task("a", TaskCategory::Voice, "Mic button", "")).is_ok());
        assert!(check_auto_fixable(&task("a", TaskCategory::Voice, "x", "button")).is_err());

        let err = check_auto_fixable(&task("a", TaskCategory::Security, "color", "")).unwrap_err();
        assert_eq!(err, "security tasks need manual attention");
    }

    #[test]
    fn japanese_titles_and_descriptions_count() {
        assert!(check_auto_fixable(&task("a", TaskCategory::UiUx, "ボタンの色", "")).is_ok());
        assert!(check_auto_fixable(&task("a", TaskCategory::UiUx, "ヘッダー", "文字の色が薄い")).is_ok());
        assert!(check_auto_fixable(&task("a", TaskCategory::UiUx, "スタイル調整", "")).is_ok());
        assert!(check_auto_fixable(&task("a", TaskCategory::UiUx, "レイアウト崩れ", "")).is_ok());
        assert!(check_auto_fixable(&task("a", TaskCategory::Reasoning, "x", "エラー処理")).is_ok());
        assert!(check_auto_fixable(&task("a", TaskCategory::Voice, "録音ボタン", "")).is_ok());
        assert!(check_auto_fixable(&task("a", TaskCategory::Voice, "x", "ボタン")).is_err());
    }

    #[test]
    fn summary_counts_and_collects_patches() {
        let generator = CatalogPatchGenerator::new(vec![PatchTemplate {
            key: "ui_color".into(),
            category: TaskCategory::UiUx,
            keywords: vec!["color".into()],
            file_path: "styles/app.css".into(),
            patch: "@@ -1 +1 @@\n-a\n+b\n".into(),
            description: String::new(),
            risk_level: RiskLevel::Low,
            estimated_impact: String::new(),
        }]);
        let tasks = vec![
            task("t1", TaskCategory::UiUx, "Color contrast", ""),
            task("t2", TaskCategory::Device, "Battery", ""),
            task("t3", TaskCategory::Reasoning, "Error handling", ""),
        ];

        let classified = identify(&tasks, &generator);
        assert_eq!(classified[1].reason.as_deref(), Some("device tasks need manual attention"));

        let summary = summarize(classified);
        assert_eq!(summary.total_tasks, 3);
        assert_eq!(summary.auto_fixable_count, 2);
        assert_eq!(summary.tasks.len(), 2);
        assert_eq!(summary.patches.len(), 1);
        assert_eq!(summary.patches[0].id, "patch_t1_ui_color");
    }
}
