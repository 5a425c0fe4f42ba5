//! Stubby stubs file linter CLI
//!
//! Usage:
//!   stubby-lint <directory_or_file> [OPTIONS]

use clap::{Parser, ValueEnum};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use stubby_lint::{lint_directory, lint_file, LintIssue, LintOptions, LintResult, Severity};

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Output {
    Text,
    Json,
}

/// Stubby stubs file linter
#[derive(Parser, Debug)]
#[command(name = "stubby-lint")]
#[command(author, version, about = "Validate Stubby stubs YAML files before loading them")]
struct Args {
    /// Stubs file, or a directory of .yaml/.yml files
    #[arg(required = true)]
    path: PathBuf,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    output: Output,

    /// Only show errors (hide warnings)
    #[arg(short = 'e', long)]
    errors_only: bool,

    /// Also report informational findings
    #[arg(short, long)]
    verbose: bool,

    /// Treat warnings as errors
    #[arg(short, long)]
    strict: bool,

    /// Do not check that referenced files exist
    #[arg(long)]
    skip_file_checks: bool,
}

fn main() {
    let args = Args::parse();
    let options = LintOptions {
        verbose: args.verbose,
        skip_file_checks: args.skip_file_checks,
    };

    let result = if args.path.is_dir() {
        lint_directory(&args.path, &options)
    } else {
        lint_file(&args.path, &options)
    };

    match args.output {
        Output::Json => print_results_json(&result),
        Output::Text => print_results(&result, &args),
    }

    std::process::exit(if result.failed(args.strict) { 1 } else { 0 });
}

fn print_results_json(result: &LintResult) {
    match serde_json::to_string_pretty(result) {
        Ok(output) => println!("{output}"),
        Err(e) => eprintln!("Failed to serialize results: {e}"),
    }
}

fn print_results(result: &LintResult, args: &Args) {
    println!("{BOLD}{CYAN}Stubby Linter{RESET}");
    println!("{DIM}{RULE}{RESET}");
    println!("{DIM}Scanning:{RESET} {CYAN}{}{RESET}\n", args.path.display());

    let mut issues_by_file: BTreeMap<&Path, Vec<&LintIssue>> = BTreeMap::new();
    for issue in &result.issues {
        if args.errors_only && issue.severity != Severity::Error {
            continue;
        }
        issues_by_file.entry(issue.file.as_path()).or_default().push(issue);
    }

    if issues_by_file.is_empty() {
        println!("{GREEN}{BOLD}No issues found!{RESET}");
    }

    for (file, issues) in &issues_by_file {
        let file_errors = issues
            .iter()
            .filter(|i| i.severity == Severity::Error)
            .count();
        let file_warnings = issues
            .iter()
            .filter(|i| i.severity == Severity::Warning)
            .count();

        let status = if file_errors > 0 {
            format!("{RED}FAIL{RESET}")
        } else if file_warnings > 0 {
            format!("{YELLOW}WARN{RESET}")
        } else {
            format!("{CYAN}INFO{RESET}")
        };
        println!(
            "{status} {BOLD}{CYAN}{}{RESET} {DIM}({file_errors} error(s), {file_warnings} warning(s)){RESET}",
            file.display()
        );

        for issue in issues {
            let color = severity_color(issue.severity);
            let location = issue
                .location
                .as_ref()
                .map(|l| format!("{DIM}[{RESET}{CYAN}{l}{RESET}{DIM}]{RESET} "))
                .unwrap_or_default();

            println!(
                "  {color}|{RESET} {location}{BOLD}{color}{}{RESET}: {} {DIM}({color}{}{DIM}){RESET}",
                issue.severity.label(),
                issue.message,
                issue.code
            );
            if let Some(suggestion) = &issue.suggestion {
                println!("  {color}|{RESET}   {GREEN}-> {suggestion}{RESET}");
            }
        }
        println!();
    }

    println!("{DIM}{RULE}{RESET}");
    println!("{BOLD}{CYAN}Summary{RESET}");
    println!("{DIM}{RULE}{RESET}");
    println!("  {DIM}Files checked:{RESET} {BOLD}{}{RESET}", result.files_checked);
    let error_color = if result.errors > 0 { RED } else { GREEN };
    println!("  {error_color}Errors:{RESET}    {BOLD}{error_color}{}{RESET}", result.errors);
    let warning_color = if result.warnings > 0 { YELLOW } else { DIM };
    println!("  {warning_color}Warnings:{RESET}  {BOLD}{}{RESET}", result.warnings);
    println!();

    if result.failed(args.strict) {
        println!("{RED}{BOLD}Linting failed{RESET}");
    } else if result.warnings > 0 {
        println!("{YELLOW}{BOLD}Passed with warnings{RESET}");
    } else {
        println!("{GREEN}{BOLD}All checks passed!{RESET}");
    }
}

fn severity_color(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => RED,
        Severity::Warning => YELLOW,
        Severity::Info => CYAN,
    }
}
