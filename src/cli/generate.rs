use super::prompt::Prompter;
use super::{print_truncation_warning, Config, GREEN, RED, RESET, YELLOW};
use anyhow::{Context, Result};
use chef_ai::contexts::{extract_response, normalize, summarize, FileMaterializer, MaterializeReport};
use chef_ai::data::{is_directory_path, FileTypeSummary, Manifest};
use std::path::Path;

/// Inputs that shape one `generate` run
pub struct GenerateRequest<'a> {
    pub output_dir: &'a Path,
    /// Skip the confirmation unless the manifest only holds directories
    pub assume_yes: bool,
}

/// Turns an assistant reply into files under the output directory
///
/// Returns the write report, or `None` when nothing was written (no usable
/// manifest, dry run, or the user declined).
pub fn materialize_reply(
    reply: &str,
    truncated: bool,
    request: &GenerateRequest<'_>,
    prompter: &mut dyn Prompter,
    config: &Config,
) -> Result<Option<MaterializeReport>> {
    let extraction = extract_response(reply);
    let Some(candidate) = extraction.manifest.as_ref() else {
        println!(
            "{}Could not find a file manifest in the assistant's reply.{}",
            YELLOW, RESET
        );
        println!("Raw response:\n\n{}", reply);
        print_truncation_warning(truncated);
        return Ok(None);
    };

    if config.verbose {
        if let Some(strategy) = extraction.strategy {
            println!("Manifest extracted via {}", strategy);
        }
    }

    let explanation = extraction.explanation.trim();
    if !explanation.is_empty() {
        println!("{}\n", explanation);
    }
    print_truncation_warning(truncated);

    let manifest = normalize(candidate);
    if manifest.is_empty() {
        println!(
            "{}The manifest in the reply contained no usable entries.{}",
            YELLOW, RESET
        );
        return Ok(None);
    }

    let summary = summarize(&manifest);
    print_plan(&manifest, &summary, request.output_dir);

    if config.dry_run {
        for path in manifest.paths() {
            println!(
                "[DRY RUN] Would create {}",
                request.output_dir.join(path).display()
            );
        }
        return Ok(None);
    }

    let must_confirm = !request.assume_yes || !summary.has_real_files;
    if !summary.has_real_files {
        println!(
            "{}Warning: the manifest only creates directories; no file contents were returned.{}",
            YELLOW, RESET
        );
    }
    if must_confirm && !prompter.confirm("Create these files?", true)? {
        println!("Cancelled.");
        return Ok(None);
    }

    let report = FileMaterializer::new(request.output_dir)
        .materialize(&manifest)
        .with_context(|| {
            format!(
                "Failed to prepare output directory {}",
                request.output_dir.display()
            )
        })?;
    print_report(&report, request.output_dir);

    if report.created == 0 && report.total > 0 {
        anyhow::bail!("No files could be created in {}", request.output_dir.display());
    }
    Ok(Some(report))
}

fn print_plan(manifest: &Manifest, summary: &FileTypeSummary, output_dir: &Path) {
    println!(
        "Planned output in {} ({} entr{}):",
        output_dir.display(),
        manifest.len(),
        if manifest.len() == 1 { "y" } else { "ies" }
    );
    for (path, content) in manifest.iter() {
        if is_directory_path(path) {
            println!("  {}", path);
        } else {
            println!("  {} ({} bytes)", path, content.len());
        }
    }

    let histogram: Vec<String> = summary
        .file_types
        .iter()
        .map(|(label, count)| format!("{}: {}", label, count))
        .collect();
    println!("File types: {}", histogram.join(", "));
    println!("Primary purpose: {}\n", summary.primary_purpose);
}

fn print_report(report: &MaterializeReport, output_dir: &Path) {
    let mark = if report.is_complete() {
        format!("{}✓{}", GREEN, RESET)
    } else {
        format!("{}✗{}", RED, RESET)
    };
    println!(
        "{} Created {}/{} entries in {}",
        mark,
        report.created,
        report.total,
        output_dir.display()
    );
    for (path, reason) in &report.errors {
        eprintln!("{}  ✗ {}: {}{}", RED, path, reason, RESET);
    }
    for path in &report.backed_up {
        println!("  backed up {}", path);
    }
}
