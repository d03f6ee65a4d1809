use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use anyhow::{Context, Result};
use covcollect_core::hitmap::{self, DiskCoverageFile};
use covcollect_core::report::{self, ReportOptions};
use covcollect_core::resolve::{FsLoader, FsResolver, Loader, Resolver};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    Lcov,
    Pretty,
}

pub struct ReportArgs {
    pub input: PathBuf,
    pub project_root: PathBuf,
    pub packages: Vec<(String, PathBuf)>,
    pub format: Format,
    pub report_on: Vec<PathBuf>,
    pub base_path: Option<PathBuf>,
    pub report_funcs: bool,
    pub output: Option<PathBuf>,
}

pub fn run(args: ReportArgs) -> Result<()> {
    let file = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading '{}'", args.input.display()))?;
    let disk: DiskCoverageFile =
        serde_json::from_str(&file).with_context(|| format!("parsing '{}'", args.input.display()))?;

    let mut resolver = FsResolver::new(&args.project_root);
    for (name, lib_root) in &args.packages {
        resolver = resolver.with_package(name.clone(), lib_root.clone());
    }
    let loader = FsLoader;

    // Scan every resolvable source once up front for ignore directives, so
    // masking happens before the map is handed to either formatter.
    let mut ignored_lines: HashMap<String, BTreeSet<u32>> = HashMap::new();
    for entry in &disk.coverage {
        let Some(uri) = resolver.resolve(&entry.source) else {
            continue;
        };
        if let Ok(text) = loader.load(&uri) {
            let lines: Vec<&str> = text.lines().collect();
            ignored_lines.insert(uri, hitmap::ignored_lines(&lines));
        }
    }

    let map = hitmap::from_disk_format(&disk, |uri| resolver.resolve(uri), &ignored_lines)
        .context("decoding coverage entries")?;

    let options = ReportOptions {
        report_on: args.report_on,
        base_path: args.base_path,
        report_funcs: args.report_funcs,
    };

    let rendered = match args.format {
        Format::Lcov => report::lcov::render(&map, &resolver, &options)?,
        Format::Pretty => report::pretty::render(&map, &resolver, &loader, &options)?,
    };

    match args.output {
        Some(path) => {
            std::fs::write(&path, rendered).with_context(|| format!("writing '{}'", path.display()))?;
        }
        None => print!("{rendered}"),
    }

    Ok(())
}
