use anyhow::Context;
use async_trait::async_trait;
use mend_core::report::FindingsReport;
use std::path::PathBuf;

/// Supplies the findings a cycle starts from.
#[async_trait]
pub trait FindingsSource: Send + Sync {
    async fn fetch(&self) -> anyhow::Result<FindingsReport>;
}

/// Reads a findings report from a JSON file on every fetch.
#[derive(Debug, Clone)]
pub struct JsonReportSource {
    path: PathBuf,
}

impl JsonReportSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl FindingsSource for JsonReportSource {
    async fn fetch(&self) -> anyhow::Result<FindingsReport> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("reading findings report: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing findings report: {}", self.path.display()))
    }
}

/// A fixed report, handed out on every fetch.
#[derive(Debug, Clone)]
pub struct StaticReportSource(pub FindingsReport);

#[async_trait]
impl FindingsSource for StaticReportSource {
    async fn fetch(&self) -> anyhow::Result<FindingsReport> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reads_report_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        std::fs::write(
            &path,
            r#"{"generated_at":"2026-03-01T00:00:00Z","log_evaluation":{"error_rate":9.5}}"#,
        )
        .unwrap();
        let report = JsonReportSource::new(&path).fetch().await.unwrap();
        assert_eq!(report.log_evaluation.error_rate, 9.5);
    }

    #[tokio::test]
    async fn missing_file_is_an_error_with_path() {
        let err = JsonReportSource::new("/no/such/report.json")
            .fetch()
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("/no/such/report.json"));
    }
}
