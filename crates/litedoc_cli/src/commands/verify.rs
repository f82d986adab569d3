//! Verify command implementation.

use super::{open_existing, print_json, CliError, Format};
use litedoc_core::RecoveryReport;
use serde_json::json;
use std::path::Path;
use tracing::info;

/// Runs the verify command. Fails with [`CliError::VerifyFailed`] when the
/// pass reports any issue.
pub fn run(path: &Path, format: Format) -> Result<(), CliError> {
    let db = open_existing(path)?;
    info!(path = %path.display(), "verifying database");
    let report = db.verify()?;

    match format {
        Format::Json => print_json(&to_json(&report))?,
        Format::Text => print_text_output(&report),
    }

    if report.is_clean() {
        Ok(())
    } else {
        Err(CliError::VerifyFailed(report.issues.len()))
    }
}

fn to_json(report: &RecoveryReport) -> serde_json::Value {
    let issues: Vec<_> = report
        .issues
        .iter()
        .map(|issue| {
            json!({
                "operation": issue.operation,
                "record": issue.record.map(|address| address.to_string()),
                "code": issue.error.code() as u16,
                "error": issue.error.to_string(),
            })
        })
        .collect();
    json!({
        "clean": report.is_clean(),
        "pages_checked": report.pages_checked,
        "documents_checked": report.documents_checked,
        "remedy": report.remedy().to_string(),
        "issues": issues,
    })
}

fn print_text_output(report: &RecoveryReport) {
    println!(
        "Checked {} pages, {} documents",
        report.pages_checked, report.documents_checked
    );
    if report.is_clean() {
        println!("OK");
        return;
    }
    for issue in &report.issues {
        println!("  ERROR: {issue}");
    }
    println!("Suggested remedy: {}", report.remedy());
}

#[cfg(test)]
mod tests {
    use super::*;
    use litedoc_bson::doc;
    use litedoc_core::Database;

    #[test]
    fn clean_report_as_json() {
        let db = Database::open_in_memory().unwrap();
        db.insert("people", doc! { "_id" => 1 }).unwrap();
        let json = to_json(&db.verify().unwrap());
        assert_eq!(json["clean"], true);
        assert_eq!(json["documents_checked"], 1);
        assert_eq!(json["remedy"], "none");
        assert_eq!(json["issues"].as_array().map(Vec::len), Some(0));
    }
}
