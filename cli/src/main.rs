//! Command-line driver for the coverage collection and normalization core:
//! connects to a running program's VM Service, merges accumulated on-disk
//! coverage files, and renders a merged file as LCOV or an annotated
//! listing.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod collect;
mod merge;
mod report;

#[derive(Parser)]
#[command(name = "covcollect")]
#[command(version)]
#[command(about = "Coverage collection and normalization", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to a running program's VM Service and collect coverage
    Collect {
        /// VM Service URI, e.g. http://127.0.0.1:8181/auth-token/
        #[arg(long)]
        uri: String,

        /// Where to write the on-disk coverage JSON
        #[arg(short, long)]
        output: PathBuf,

        /// Restrict collection to these top-level package names
        #[arg(long)]
        scope: Vec<String>,

        /// Collect per-function hit counts in addition to per-line
        #[arg(long)]
        function_coverage: bool,

        /// Collect branch hit counts where the VM Service supports it
        #[arg(long)]
        branch_coverage: bool,

        /// Retain `dart:`-scheme (SDK) sources
        #[arg(long)]
        include_sdk_sources: bool,

        /// Resume every isolate after collection completes
        #[arg(long)]
        resume_isolates: bool,

        /// Overall timeout, in seconds, for connecting and pausing isolates
        #[arg(long, default_value_t = 60)]
        timeout_secs: u64,

        /// Persist the coverable-line cache here across repeated collect
        /// runs against the same running program
        #[arg(long)]
        cache_file: Option<PathBuf>,
    },

    /// Merge one or more on-disk coverage JSON files into one
    Merge {
        /// Input coverage JSON files
        inputs: Vec<PathBuf>,

        /// Where to write the merged coverage JSON
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Render a merged coverage JSON file as LCOV or an annotated listing
    Report {
        /// Merged coverage JSON file to render
        input: PathBuf,

        /// Project root used to resolve `package:`/`file://` source URIs
        #[arg(long)]
        project_root: PathBuf,

        /// `name=lib_root` package mappings, repeatable
        #[arg(long = "package", value_parser = parse_package_mapping)]
        packages: Vec<(String, PathBuf)>,

        /// Output format
        #[arg(long, value_enum, default_value_t = ReportFormat::Lcov)]
        format: ReportFormat,

        /// Only emit sources under this path prefix
        #[arg(long)]
        report_on: Vec<PathBuf>,

        /// Relativize emitted paths against this prefix
        #[arg(long)]
        base_path: Option<PathBuf>,

        /// Require and render function coverage (pretty-print only)
        #[arg(long)]
        report_funcs: bool,

        /// Where to write the rendered report (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum ReportFormat {
    Lcov,
    Pretty,
}

fn parse_package_mapping(raw: &str) -> Result<(String, PathBuf), String> {
    raw.split_once('=')
        .map(|(name, path)| (name.to_string(), PathBuf::from(path)))
        .ok_or_else(|| format!("expected 'name=path', got '{raw}'"))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Collect {
            uri,
            output,
            scope,
            function_coverage,
            branch_coverage,
            include_sdk_sources,
            resume_isolates,
            timeout_secs,
            cache_file,
        } => {
            collect::run(collect::CollectArgs {
                uri,
                output,
                scope,
                function_coverage,
                branch_coverage,
                include_sdk_sources,
                resume_isolates,
                timeout_secs,
                cache_file,
            })
            .await?;
        }

        Commands::Merge { inputs, output } => {
            merge::run(&inputs, &output)?;
        }

        Commands::Report {
            input,
            project_root,
            packages,
            format,
            report_on,
            base_path,
            report_funcs,
            output,
        } => {
            report::run(report::ReportArgs {
                input,
                project_root,
                packages,
                format: match format {
                    ReportFormat::Lcov => report::Format::Lcov,
                    ReportFormat::Pretty => report::Format::Pretty,
                },
                report_on,
                base_path,
                report_funcs,
                output,
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_collect_scope_and_flags() {
        let cli = Cli::try_parse_from([
            "covcollect",
            "collect",
            "--uri",
            "http://127.0.0.1:8181/token/",
            "--output",
            "out.json",
            "--scope",
            "my_app",
            "--function-coverage",
        ])
        .unwrap();
        match cli.command {
            Commands::Collect {
                scope, function_coverage, branch_coverage, ..
            } => {
                assert_eq!(scope, vec!["my_app".to_string()]);
                assert!(function_coverage);
                assert!(!branch_coverage);
            }
            _ => panic!("expected Collect command"),
        }
    }

    #[test]
    fn parses_report_package_mappings() {
        let cli = Cli::try_parse_from([
            "covcollect",
            "report",
            "coverage.json",
            "--project-root",
            ".",
            "--package",
            "my_app=lib",
        ])
        .unwrap();
        match cli.command {
            Commands::Report { packages, .. } => {
                assert_eq!(packages, vec![("my_app".to_string(), PathBuf::from("lib"))]);
            }
            _ => panic!("expected Report command"),
        }
    }
}
