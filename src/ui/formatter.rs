//! Pure formatting functions for UI output.
//!
//! This module contains all display/formatting logic separated from user interaction.
//! Functions here have no side effects beyond printing.

use console::style;

use crate::ports::PortKind;
use crate::release::MergeReport;
use crate::warning::Warning;

/// Format and print an error message in red.
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("ERROR:").red(), message);
}

/// Format and print a success message with green checkmark.
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

/// Format and print a status message with yellow arrow.
pub fn display_status(message: &str) {
    println!("{} {}", style("→").yellow(), message);
}

/// Display a warning to the user.
///
/// Shows a yellow warning icon followed by the warning message.
pub fn display_warning(warning: &Warning) {
    eprintln!("{} {}", style("⚠ WARNING:").yellow(), warning);
}

/// Display the resources found for one port type.
pub fn display_resources(kind: PortKind, resources: &[String]) {
    println!("{}", style(format!("{} ({})", kind, resources.len())).bold());
    if resources.is_empty() {
        println!("  {}", style("none found").dim());
    }
    for resource in resources {
        println!("  - {}", resource);
    }
}

/// Lines `variable = value unit`, one per variable.
///
/// Variables without a value are skipped; missing units are left out.
pub fn format_measurement(variables: &[String], units: &[String], values: &[f64]) -> Vec<String> {
    variables
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (variable, value))| match units.get(i) {
            Some(unit) if !unit.is_empty() => format!("{} = {} {}", variable, value, unit),
            _ => format!("{} = {}", variable, value),
        })
        .collect()
}

/// Display one reading of a driver.
pub fn display_measurement(variables: &[String], units: &[String], values: &[f64]) {
    for line in format_measurement(variables, units, values) {
        println!("  {}", line);
    }
}

/// Display the outcome of a successful branch-merge check.
pub fn display_merge_report(report: &MergeReport) {
    println!(
        "\n{}",
        style(format!(
            "Merging '{}' into '{}'",
            report.source, report.target
        ))
        .bold()
    );
    println!("  Commits to merge: {}", report.commits);
    if report.merges.is_empty() {
        println!("  History is linear");
        return;
    }
    if let Some(predecessor) = &report.predecessor {
        println!(
            "  Merge commits from preceding version '{}':",
            style(predecessor).cyan()
        );
    }
    for merge in report.merges.iter().take(10) {
        let summary = merge.message.lines().next().unwrap_or("");
        println!("    {} {}", short_hash(&merge.hash), summary);
    }
    if report.merges.len() > 10 {
        println!("    ... and {} more merge commits", report.merges.len() - 10);
    }
}

fn short_hash(hash: &str) -> &str {
    hash.get(..7).unwrap_or(hash)
}
