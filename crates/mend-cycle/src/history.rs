//! Bounded cycle history, persisted at `.mend/history.json`.

use crate::cycle_log::CycleLog;
use anyhow::Context;
use std::cmp::Ordering;
use std::path::Path;

/// Ring buffer of cycle logs keyed by id. Oldest entries are evicted once
/// `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct CycleHistory {
    capacity: usize,
    /// Oldest first.
    logs: Vec<CycleLog>,
}

impl CycleHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            logs: Vec::new(),
        }
    }

    /// Load from disk. A missing file is an empty history.
    pub fn load(path: &Path, capacity: usize) -> anyhow::Result<Self> {
        let mut history = Self::new(capacity);
        if !path.exists() {
            return Ok(history);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading history: {}", path.display()))?;
        let logs: Vec<CycleLog> = serde_json::from_str(&content)
            .with_context(|| format!("parsing history: {}", path.display()))?;
        for log in logs {
            history.record(log);
        }
        Ok(history)
    }

    /// Save atomically (temp file, then rename).
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let data = serde_json::to_string_pretty(&self.logs)?;
        mend_store::write_atomic(path, data.as_bytes())
            .with_context(|| format!("saving history: {}", path.display()))?;
        Ok(())
    }

    /// Append, or replace the entry with the same id in place.
    pub fn record(&mut self, log: CycleLog) {
        match self.logs.iter_mut().find(|l| l.id == log.id) {
            Some(existing) => *existing = log,
            None => {
                self.logs.push(log);
                let excess = self.logs.len().saturating_sub(self.capacity);
                if excess > 0 {
                    self.logs.drain(..excess);
                }
            }
        }
    }

    /// Up to `n` logs, most recently started first.
    pub fn recent(&self, n: usize) -> Vec<CycleLog> {
        let mut order: Vec<(usize, &CycleLog)> = self.logs.iter().enumerate().collect();
        order.sort_by(|(ia, a), (ib, b)| {
            compare_started(&b.started_at, &a.started_at).then_with(|| ib.cmp(ia))
        });
        order.into_iter().take(n).map(|(_, l)| l.clone()).collect()
    }

    pub fn latest(&self) -> Option<CycleLog> {
        self.recent(1).into_iter().next()
    }

    pub fn get(&self, id: &str) -> Option<&CycleLog> {
        self.logs.iter().find(|l| l.id == id)
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }
}

fn compare_started(a: &str, b: &str) -> Ordering {
    let fmt = &time::format_description::well_known::Rfc3339;
    match (
        time::OffsetDateTime::parse(a, fmt),
        time::OffsetDateTime::parse(b, fmt),
    ) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cycle_log::CycleStatus;

    fn log(id: &str, started_at: &str) -> CycleLog {
        let mut l = CycleLog::start(false);
        l.id = id.into();
        l.started_at = started_at.into();
        l
    }

    fn ids(logs: &[CycleLog]) -> Vec<&str> {
        logs.iter().map(|l| l.id.as_str()).collect()
    }

    #[test]
    fn recent_is_descending_and_bounded_by_n() {
        let mut h = CycleHistory::new(10);
        for (i, ts) in ["2026-01-01T00:00:00Z", "2026-01-03T00:00:00Z", "2026-01-02T00:00:00Z"]
            .iter()
            .enumerate()
        {
            h.record(log(&format!("c{i}"), ts));
        }
        assert_eq!(ids(&h.recent(2)), vec!["c1", "c2"]);
        assert_eq!(ids(&h.recent(10)), vec!["c1", "c2", "c0"]);
        assert_eq!(h.latest().unwrap().id, h.recent(1)[0].id);
    }

    #[test]
    fn equal_start_times_prefer_later_insert() {
        let mut h = CycleHistory::new(10);
        h.record(log("first", "2026-01-01T00:00:00Z"));
        h.record(log("second", "2026-01-01T00:00:00Z"));
        assert_eq!(h.latest().unwrap().id, "second");
    }

    #[test]
    fn capacity_evicts_oldest() {
        let mut h = CycleHistory::new(2);
        h.record(log("a", "2026-01-01T00:00:00Z"));
        h.record(log("b", "2026-01-02T00:00:00Z"));
        h.record(log("c", "2026-01-03T00:00:00Z"));
        assert_eq!(h.len(), 2);
        assert!(h.get("a").is_none());
    }

    #[test]
    fn record_replaces_by_id() {
        let mut h = CycleHistory::new(2);
        let mut running = log("a", "2026-01-01T00:00:00Z");
        h.record(running.clone());
        running.complete();
        h.record(running);
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("a").unwrap().status, CycleStatus::Completed);
    }

    #[test]
    fn save_and_load_reapplies_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".mend").join("history.json");
        let mut h = CycleHistory::new(5);
        for i in 0..4 {
            h.record(log(&format!("c{i}"), &format!("2026-01-0{}T00:00:00Z", i + 1)));
        }
        h.save(&path).unwrap();

        let loaded = CycleHistory::load(&path, 2).unwrap();
        assert_eq!(ids(&loaded.recent(5)), vec!["c3", "c2"]);
        assert!(CycleHistory::load(&dir.path().join("none.json"), 2)
            .unwrap()
            .is_empty());
    }
}
