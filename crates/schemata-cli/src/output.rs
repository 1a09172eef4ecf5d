use schemata_db::MigrationVersion;
use schemata_db::runner::{MigrationPlan, MigrationReport, MigrationStatus};

const WIDTH: usize = 70;

fn version_label(version: Option<MigrationVersion>) -> String {
    version.map_or_else(|| "none".to_string(), |v| v.to_string())
}

fn top(title: &str) -> String {
    let dashes = WIDTH.saturating_sub(title.chars().count() + 7);
    format!("╭─── {title} {}╮", "─".repeat(dashes))
}

fn bottom() -> String {
    format!("╰{}╯", "─".repeat(WIDTH - 2))
}

fn row(text: &str) -> String {
    let inner = WIDTH - 4;
    format!("│ {text:<inner$} │")
}

/// Boxed summary of applied and pending migrations.
pub fn print_status(status: &MigrationStatus, location: &str) {
    let version = env!("CARGO_PKG_VERSION");

    println!("{}", top(&format!("Schemata v{version}")));
    println!("{}", row(&format!("Database    {location}")));
    println!(
        "{}",
        row(&format!("Version     {}", version_label(status.current_version)))
    );
    println!("{}", row(""));

    if status.applied.is_empty() {
        println!("{}", row("Applied     none"));
    } else {
        println!("{}", row("Applied"));
        for record in &status.applied {
            println!(
                "{}",
                row(&format!(
                    "  {:>6}  {}  {}",
                    record.version,
                    record.applied_at.format("%Y-%m-%d %H:%M:%S"),
                    record.description
                ))
            );
        }
    }

    if status.pending.is_empty() {
        println!("{}", row("Pending     none"));
    } else {
        println!("{}", row("Pending"));
        for pending in &status.pending {
            println!(
                "{}",
                row(&format!("  {:>6}  {}", pending.version, pending.name))
            );
        }
    }
    println!("{}", bottom());
}

pub fn print_report(report: &MigrationReport) {
    if report.is_up_to_date() {
        println!(
            "Schema is up to date at version {}.",
            version_label(report.current_version)
        );
        return;
    }
    let count = report.applied.len();
    println!(
        "Applied {count} migration{} ({} -> {}).",
        if count == 1 { "" } else { "s" },
        version_label(report.previous_version),
        version_label(report.current_version)
    );
}

/// SQL script for the plan's dialect, one commented block per step.
pub fn print_plan(plan: &MigrationPlan) {
    let dialect = plan.dialect;
    if plan.steps.is_empty() {
        println!("-- nothing to apply on {dialect}");
        return;
    }
    if !plan.setup.is_empty() {
        println!("-- schema history table ({dialect})");
        for sql in &plan.setup {
            println!("{sql};");
        }
        println!();
    }
    for step in &plan.steps {
        println!("-- {} {} ({dialect})", step.version, step.name);
        for sql in &step.statements {
            println!("{sql};");
        }
        if let Some(error) = &step.error {
            println!("-- cannot be planned offline: {error}");
        }
        println!();
    }
}
