//! Report persistence and console digest

use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use tracing::info;

use crate::error::E2eResult;
use crate::report::{RunReport, Status};

/// `test-report-<ISO 8601>.json` with `:` and `.` replaced by `-`.
///
/// Two saves within the same millisecond map to the same name; the later
/// one overwrites the earlier.
pub fn report_file_name(at: DateTime<Utc>) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace(|c: char| c == ':' || c == '.', "-");
    format!("test-report-{}.json", stamp)
}

/// Writes finished reports to disk.
#[derive(Debug, Clone)]
pub struct ReportSink {
    output_dir: PathBuf,
    print_digest: bool,
}

impl ReportSink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            print_digest: true,
        }
    }

    /// Skip the console digest.
    pub fn quiet(mut self) -> Self {
        self.print_digest = false;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Serialize `report` to a timestamped file and print its digest.
    ///
    /// I/O errors are returned as-is.
    pub fn save_report(&self, report: &RunReport) -> E2eResult<PathBuf> {
        self.save_report_at(report, Utc::now())
    }

    pub fn save_report_at(&self, report: &RunReport, at: DateTime<Utc>) -> E2eResult<PathBuf> {
        std::fs::create_dir_all(&self.output_dir)?;

        let path = self.output_dir.join(report_file_name(at));
        let json = serde_json::to_string_pretty(report)?;
        std::fs::write(&path, json)?;

        info!("Report written to: {}", path.display());
        if self.print_digest {
            println!("{}", digest(report));
        }
        Ok(path)
    }
}

/// Short human-readable summary of a report.
pub fn digest(report: &RunReport) -> String {
    let success = report.status() == Status::Success;
    let (mark, color) = if success {
        ("✓", Color::Green)
    } else {
        ("✗", Color::Red)
    };

    let duration = report
        .duration_ms()
        .map(|ms| format!("{} ms", ms))
        .unwrap_or_else(|| "-".to_string());

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table.add_row(vec![Cell::new("Test"), Cell::new(report.test_name())]);
    table.add_row(vec![
        Cell::new("Status"),
        Cell::new(format!("{} {}", mark, report.status().as_str().to_uppercase()))
            .fg(color)
            .add_attribute(Attribute::Bold),
    ]);
    table.add_row(vec![Cell::new("Duration"), Cell::new(duration)]);
    table.add_row(vec![Cell::new("Steps"), Cell::new(report.step_count())]);
    table.add_row(vec![Cell::new("Successful"), Cell::new(report.success_count())]);

    let title = if success {
        "Test Report".green().bold()
    } else {
        "Test Report".red().bold()
    };
    format!("{}\n{}", title, table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::StepOutcome;
    use chrono::TimeZone;

    fn finished_report() -> RunReport {
        let mut report = RunReport::new("iframe-practice", Some("https://a.test".into()));
        let nav = report.add_step("navigate");
        report.complete_step(nav, StepOutcome::success());
        let fill = report.add_step("fill #tea");
        report.complete_step(fill, StepOutcome::error("element detached"));
        report
            .complete(Status::Error, Some("Test failed: element detached".into()))
            .unwrap();
        report
    }

    #[test]
    fn test_file_name_has_no_unsafe_separators() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 45).unwrap()
            + chrono::Duration::milliseconds(123);
        assert_eq!(report_file_name(at), "test-report-2024-05-01T12-30-45-123Z.json");
    }

    #[test]
    fn test_saves_one_second_apart_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ReportSink::new(dir.path()).quiet();
        let report = finished_report();
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let first = sink.save_report_at(&report, at).unwrap();
        let second = sink
            .save_report_at(&report, at + chrono::Duration::seconds(1))
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_saved_file_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let sink = ReportSink::new(dir.path().join("nested")).quiet();
        let report = finished_report();

        let path = sink.save_report(&report).unwrap();
        let loaded: RunReport = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();

        assert_eq!(
            serde_json::to_value(&loaded).unwrap(),
            serde_json::to_value(&report).unwrap()
        );
        assert_eq!(loaded.duration_ms(), Some(
            (loaded.end_time().unwrap() - loaded.start_time()).num_milliseconds()
        ));
    }

    #[test]
    fn test_write_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let sink = ReportSink::new(&blocker).quiet();
        assert!(sink.save_report(&finished_report()).is_err());
    }

    #[test]
    fn test_digest_lists_counts() {
        colored::control::set_override(false);
        let text = digest(&finished_report());
        assert!(text.contains("iframe-practice"));
        assert!(text.contains("ERROR"));
        assert!(text.contains("Steps"));
        assert!(text.contains("Successful"));
    }
}
