use super::progress::ScanTally;
use super::prompt::Prompter;
use super::{Config, GREEN, RED, RESET, YELLOW};
use anyhow::{Context, Result};
use chef_ai::backup_ledger::BackupLedger;
use chef_ai::contexts::{
    MigrationAnalyzer, MigrationOptions, MigrationSession, MigrationStrategy, PlannedChange,
    ScanProgress,
};
use std::path::Path;

/// Inputs that shape one `migrate` run
pub struct MigrateRequest<'a> {
    pub target: &'a Path,
    pub output_dir: Option<&'a Path>,
    pub scan_only: bool,
    pub assume_yes: bool,
}

/// Scans the target, reports issues and writes migrated files
///
/// Returns the finished session so callers can inspect its final state.
pub fn run_migration<A: MigrationAnalyzer>(
    options: MigrationOptions,
    request: &MigrateRequest<'_>,
    analyzer: &mut A,
    prompter: &mut dyn Prompter,
    config: &Config,
) -> Result<MigrationSession> {
    let mut session = MigrationSession::new(request.target, options);
    let files = session.discover().context("Failed to collect files to migrate")?;

    if files.is_empty() {
        println!(
            "No files with extension(s) {} found under {}",
            session.options().extensions.join(", "),
            request.target.display()
        );
        return Ok(session);
    }

    println!(
        "Migrating {} file(s) from Chef {} to {}",
        files.len(),
        session.options().from_version,
        session.options().to_version
    );

    if config.dry_run {
        for file in &files {
            println!("[DRY RUN] Would analyze {}", file.display());
        }
        return Ok(session);
    }

    let mut tally = ScanTally::new(files.len());
    session.scan(analyzer, |event| match event {
        ScanProgress::Started { file, .. } => tally.begin(file),
        ScanProgress::Finished { file, success } => tally.record(file, success),
    })?;
    tally.print_summary();

    for (file, reason) in session.failures() {
        eprintln!("{}✗ {}: {}{}", RED, file, reason, RESET);
    }

    let flagged: Vec<_> = session.issues().collect();
    if flagged.is_empty() {
        println!("{}✓ No migration issues found{}", GREEN, RESET);
        return Ok(session);
    }

    println!("\n{} file(s) need changes:\n", flagged.len());
    for result in &flagged {
        println!("── {} ──", result.relative_path);
        println!("{}\n", result.ai_analysis_text.trim());
    }

    if request.scan_only {
        session.finish_scan_only()?;
        println!("Scan only: no files were modified.");
        return Ok(session);
    }

    let plan = session.plan();
    let needs_review = print_plan(&plan);
    let must_confirm = !request.assume_yes || needs_review;
    let question = match request.output_dir {
        Some(dir) => format!("Write migrated files to {}?", dir.display()),
        None => "Rewrite these files in place (originals are backed up)?".to_string(),
    };
    if must_confirm && !prompter.confirm(&question, false)? {
        println!("Cancelled.");
        return Ok(session);
    }

    let report = session.apply(request.output_dir)?;

    let mark = if report.errors.is_empty() {
        format!("{}✓{}", GREEN, RESET)
    } else {
        format!("{}✗{}", RED, RESET)
    };
    println!("{} Wrote {}/{} migrated file(s)", mark, report.written, report.total);
    for (file, reason) in &report.errors {
        eprintln!("{}  ✗ {}: {}{}", RED, file, reason, RESET);
    }
    for file in &report.unchanged {
        println!("  unchanged: {}", file);
    }
    if let Some(dir) = &report.backup_dir {
        println!("Originals backed up to {}", dir.display());
    }
    if let (Some(dir), Some(ledger_path)) = (&report.backup_dir, &report.ledger_path) {
        if config.verbose {
            let ledger = BackupLedger::load(dir)?;
            println!("Backup ledger {}:\n{}", ledger_path.display(), ledger.summary());
        }
    }

    Ok(session)
}

/// Prints the planned changes; true when a change needs a closer look
fn print_plan(plan: &[PlannedChange]) -> bool {
    let mut needs_review = false;
    println!("Planned changes:");
    for change in plan {
        let note = match change.strategy {
            MigrationStrategy::TruncationGuard | MigrationStrategy::OriginalFallback => {
                needs_review = true;
                format!(
                    "{}(no usable migrated code, original kept){}",
                    YELLOW, RESET
                )
            }
            _ if !change.changed => "(no changes)".to_string(),
            strategy => format!("({})", strategy),
        };
        println!("  {} {}", change.relative_path, note);
    }
    println!();
    needs_review
}
