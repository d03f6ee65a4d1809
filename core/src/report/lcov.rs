//! LCOV text serialization (spec.md §4.4, "LCOV").

use std::fmt::Write as _;

use crate::error::Result;
use crate::hitmap::{CoverageMap, HitMap};
use crate::resolve::Resolver;

use super::{display_path, resolve_and_filter, ReportOptions};

/// Renders `map` as LCOV text. Sources the resolver can't place, or that
/// `options.report_on` excludes, are silently dropped (spec.md's
/// `UnresolvedSource` policy — "drop entry; no error").
pub fn render(map: &CoverageMap, resolver: &dyn Resolver, options: &ReportOptions) -> Result<String> {
    let entries = resolve_and_filter(map, resolver, options);
    let mut out = String::new();
    for entry in entries {
        write_record(&mut out, &display_path(&entry.path, options.base_path.as_deref()), entry.hit_map)?;
    }
    Ok(out)
}

fn write_record(out: &mut String, path: &std::path::Path, hit_map: &HitMap) -> Result<()> {
    writeln!(out, "SF:{}", path.display()).ok();

    if let (Some(func_hits), Some(func_names)) = (&hit_map.func_hits, &hit_map.func_names) {
        for (line, name) in func_names {
            writeln!(out, "FN:{line},{name}").ok();
        }
        for (line, count) in func_hits {
            if *count > 0 {
                if let Some(name) = func_names.get(line) {
                    writeln!(out, "FNDA:{count},{name}").ok();
                }
            }
        }
        writeln!(out, "FNF:{}", func_names.len()).ok();
        writeln!(out, "FNH:{}", func_hits.values().filter(|&&c| c > 0).count()).ok();
    }

    for (line, count) in &hit_map.line_hits {
        writeln!(out, "DA:{line},{count}").ok();
    }
    writeln!(out, "LF:{}", hit_map.line_hits.len()).ok();
    writeln!(out, "LH:{}", hit_map.line_hits.values().filter(|&&c| c > 0).count()).ok();
    writeln!(out, "end_of_record").ok();
    Ok(())
}
