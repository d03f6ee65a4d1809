//! Pretty-printed annotated source listing (spec.md §4.4, "Pretty-print").

use std::fmt::Write as _;

use crate::error::{CollectError, Result};
use crate::hitmap::{CoverageMap, HitMap};
use crate::resolve::{Loader, Resolver};

use super::{display_path, resolve_and_filter, ReportOptions};

/// Renders `map` as an annotated source listing: each resolved file's path,
/// followed by every line prefixed with its hit count (padded to width 7)
/// or 7 spaces if the line has no recorded hit count.
pub fn render(map: &CoverageMap, resolver: &dyn Resolver, loader: &dyn Loader, options: &ReportOptions) -> Result<String> {
    let entries = resolve_and_filter(map, resolver, options);
    let mut out = String::new();

    for entry in entries {
        if options.report_funcs && entry.hit_map.func_hits.is_none() {
            return Err(CollectError::MissingFunctionCoverage);
        }

        let path_for_load = format!("file://{}", entry.path.display());
        let text = loader.load(&path_for_load)?;
        let display = display_path(&entry.path, options.base_path.as_deref());

        writeln!(out, "{}", display.display()).ok();
        write_annotated_lines(&mut out, &text, entry.hit_map);
    }

    Ok(out)
}

fn write_annotated_lines(out: &mut String, text: &str, hit_map: &HitMap) {
    for (idx, line_text) in text.lines().enumerate() {
        let line_no = (idx + 1) as u32;
        match hit_map.line_hits.get(&line_no) {
            Some(count) => writeln!(out, "{count:>7}|{line_text}"),
            None => writeln!(out, "       |{line_text}"),
        }
        .ok();
    }
}
