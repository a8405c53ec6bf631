//! Output formatters for substitution summaries

use crate::FillOutcome;
use anyhow::Result;
use colored::*;
use sheetfill_core::SubstitutionReport;
use std::path::Path;

/// Print one block per data file, one line per sheet
pub fn print_human(template: &Path, outcomes: &[FillOutcome]) {
    println!("{}", format!("Template: {}", template.display()).bold());
    println!();

    for outcome in outcomes {
        println!("{} {}", "Data:".bold(), outcome.data.display().to_string().cyan().bold());
        match &outcome.result {
            Ok(reports) => {
                for report in reports {
                    print_report(report);
                }
                match &outcome.output {
                    Some(output) => println!("  {} {}", "Wrote".green().bold(), output.display()),
                    None => println!("  {}", "Dry run, nothing written".bright_black()),
                }
            }
            Err(err) => println!("  {} {err:#}", "ERROR".red().bold()),
        }
        println!();
    }

    let failed = outcomes.iter().filter(|o| o.failed()).count();
    println!("{}", "Summary:".bold().underline());
    println!("  {} {}", "Filled:".green().bold(), outcomes.len() - failed);
    if failed > 0 {
        println!("  {} {}", "Failed:".red().bold(), failed);
    }
}

fn print_report(report: &SubstitutionReport) {
    println!(
        "  {} {}: {} placeholders, {} rows and {} columns inserted, {} images",
        "Sheet".bold(),
        report.sheet.yellow(),
        report.placeholders_substituted,
        report.rows_inserted,
        report.columns_inserted,
        report.images_placed
    );
    for unresolved in &report.unresolved {
        println!(
            "    {} {} {}",
            "WARN".yellow().bold(),
            unresolved.cell.bright_black(),
            format!("no value for {}", unresolved.placeholder)
        );
    }
}

/// Print outcomes in JSON format
pub fn print_json(template: &Path, outcomes: &[FillOutcome]) -> Result<()> {
    let files: Vec<serde_json::Value> = outcomes
        .iter()
        .map(|outcome| match &outcome.result {
            Ok(reports) => serde_json::json!({
                "data": outcome.data.display().to_string(),
                "output": outcome.output.as_ref().map(|o| o.display().to_string()),
                "sheets": reports,
            }),
            Err(err) => serde_json::json!({
                "data": outcome.data.display().to_string(),
                "error": format!("{err:#}"),
            }),
        })
        .collect();

    let output = serde_json::json!({
        "template": template.display().to_string(),
        "files": files,
        "summary": {
            "total": outcomes.len(),
            "failed": outcomes.iter().filter(|o| o.failed()).count(),
            "unresolved": outcomes
                .iter()
                .filter_map(|o| o.result.as_ref().ok())
                .flatten()
                .map(|r| r.unresolved.len())
                .sum::<usize>(),
        }
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
