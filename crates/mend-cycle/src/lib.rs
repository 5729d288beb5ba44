pub mod autofix;
pub mod catalog;
pub mod cycle_log;
pub mod genesis;
pub mod history;
pub mod runner;
pub mod source;

pub use autofix::{AutoFixSummary, AutoFixableTask};
pub use catalog::{CatalogPatchGenerator, PatchGenerator, PatchTemplate};
pub use cycle_log::{CycleLog, CycleStatus, CycleSummary, WithheldPatch};
pub use genesis::{KeywordTaskPlanner, TaskPlanner};
pub use history::CycleHistory;
pub use runner::{CycleOptions, CycleRunner};
pub use source::{FindingsSource, JsonReportSource, StaticReportSource};
