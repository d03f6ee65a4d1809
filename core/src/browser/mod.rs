//! Lowers browser-style "precise coverage" (byte/UTF-16-offset ranges over a
//! *compiled* script) into the canonical [`crate::hitmap::CoverageMap`], via
//! source-map resolution back to original source coordinates.
//!
//! The wire shapes here (`ScriptCoverage`/`FunctionCoverage`/`CoverageRange`)
//! mirror the V8 Inspector `Profiler.takePreciseCoverage` response shape,
//! the same shape a generic V8-hosted runtime (Deno, Node, a browser tab)
//! delivers when precise coverage is enabled with `detailed: true`.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::{CollectError, Result};
use crate::hitmap::{CoverageMap, HitMap, Line, Position};

pub const SDK_SENTINEL_PREFIX: &str = "org-dartlang-sdk:";

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverageRange {
    pub start_offset: usize,
    pub end_offset: usize,
    pub count: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCoverage {
    pub function_name: String,
    pub ranges: Vec<CoverageRange>,
    #[serde(default)]
    pub is_block_coverage: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptCoverage {
    pub script_id: String,
    pub url: String,
    pub functions: Vec<FunctionCoverage>,
}

/// A single flattened `[start, end)` range with a resolved covered/not-covered
/// flag (spec.md §3, `CoverageInfo`).
#[derive(Debug, Clone, Copy)]
struct CoverageInfo {
    start_offset: usize,
    end_offset: usize,
    covered: bool,
}

fn flatten(script: &ScriptCoverage, source_len: usize) -> Result<Vec<CoverageInfo>> {
    let mut ranges = Vec::new();
    for function in &script.functions {
        for range in &function.ranges {
            if range.start_offset > range.end_offset || range.end_offset > source_len {
                return Err(CollectError::InvalidCoverageEntry(format!(
                    "range [{}, {}) out of bounds for a {}-unit script",
                    range.start_offset, range.end_offset, source_len
                )));
            }
            ranges.push(CoverageInfo {
                start_offset: range.start_offset,
                end_offset: range.end_offset,
                covered: range.count > 0,
            });
        }
    }
    Ok(ranges)
}

/// Paints a `bool` array over the compiled source's UTF-16 code units: larger
/// ranges are painted first (stable sort by descending size), so the
/// tightest, most specific range wins at each offset. Offsets untouched by
/// any range default to `false`.
fn paint(mut ranges: Vec<CoverageInfo>, unit_count: usize) -> Vec<bool> {
    ranges.sort_by_key(|r| std::cmp::Reverse(r.end_offset - r.start_offset));
    let mut painted = vec![false; unit_count];
    for range in ranges {
        for slot in painted
            .get_mut(range.start_offset..range.end_offset)
            .into_iter()
            .flatten()
        {
            *slot = range.covered;
        }
    }
    painted
}

/// Walks the compiled source's UTF-16 units, tracking `(line, column)`
/// (1-based; column increments before being recorded, so the first character
/// of a line is column 1) and records the current position for every offset
/// painted `true`.
fn covered_compiled_positions(units: &[u16], painted: &[bool]) -> HashSet<Position> {
    let mut covered = HashSet::new();
    let mut line = 1u32;
    let mut column = 0u32;
    for (offset, &unit) in units.iter().enumerate() {
        column += 1;
        if painted[offset] {
            covered.insert(Position { line, column });
        }
        if unit == u16::from(b'\n') {
            line += 1;
            column = 0;
        }
    }
    covered
}

/// Lowers one script's precise coverage into a [`CoverageMap`] fragment.
///
/// `source_uri_provider(source_url, script_id)` resolves a source map's
/// `sources[]` entry to an absolute URI this crate should key the result by;
/// returning `None` drops that mapping entry (e.g. it couldn't be resolved to
/// a file on disk). Entries whose source URL starts with
/// [`SDK_SENTINEL_PREFIX`] are always skipped, regardless of what the
/// provider would return.
pub fn lower_script(
    script: &ScriptCoverage,
    compiled_source: &str,
    source_map: &sourcemap::SourceMap,
    source_uri_provider: impl Fn(&str, &str) -> Option<String>,
) -> Result<CoverageMap> {
    let units: Vec<u16> = compiled_source.encode_utf16().collect();
    let ranges = flatten(script, units.len())?;
    let painted = paint(ranges, units.len());
    let covered_positions = covered_compiled_positions(&units, &painted);

    // Aggregate per source URI; iterating the source map's tokens in their
    // natural (line-then-column ascending) order and overwriting on every
    // hit gives "last write wins" for free.
    let mut by_uri: HashMap<String, BTreeMap<Line, bool>> = HashMap::new();
    for token in source_map.tokens() {
        let Some(source_url) = token.get_source() else {
            continue;
        };
        if source_url.starts_with(SDK_SENTINEL_PREFIX) {
            continue;
        }
        let Some(uri) = source_uri_provider(source_url, &script.script_id) else {
            continue;
        };

        // Source-map coordinates are 0-based; the compiled lookup key adds 1
        // to match the 1-based `Position`s recorded by
        // `covered_compiled_positions` (spec.md §9, Open Question).
        let compiled_key = Position {
            line: token.get_dst_line() + 1,
            column: token.get_dst_col() + 1,
        };
        let source_line = token.get_src_line() + 1;
        let covered = covered_positions.contains(&compiled_key);
        by_uri.entry(uri).or_default().insert(source_line, covered);
    }

    let mut map = CoverageMap::new();
    for (uri, lines) in by_uri {
        let line_hits = lines
            .into_iter()
            .map(|(line, covered)| (line, if covered { 1 } else { 0 }))
            .collect();
        map.insert(
            uri,
            HitMap {
                line_hits,
                ..Default::default()
            },
        );
    }
    Ok(map)
}

/// Lowers every script in `scripts`, looking up each one's compiled source
/// and source map through the supplied providers. A script whose compiled
/// source or source map can't be found contributes nothing (spec.md §4.2,
/// "Failure modes") rather than failing the whole batch.
pub fn lower_all(
    scripts: &[ScriptCoverage],
    compiled_source: impl Fn(&str) -> Option<String>,
    source_map: impl Fn(&str) -> Option<sourcemap::SourceMap>,
    source_uri_provider: impl Fn(&str, &str) -> Option<String>,
) -> Result<CoverageMap> {
    let mut merged = CoverageMap::new();
    for script in scripts {
        let Some(source) = compiled_source(&script.script_id) else {
            continue;
        };
        let Some(map) = source_map(&script.script_id) else {
            continue;
        };
        let lowered = lower_script(script, &source, &map, &source_uri_provider)?;
        crate::hitmap::merge(&mut merged, lowered)?;
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s4_size_descending_precedence() {
        // Compiled source of 10 bytes, ranges (input order)
        // [(0,10,true), (3,6,false)]. After size-desc sort the smaller
        // range paints last, so offsets 3-5 are false, others true.
        let ranges = vec![
            CoverageInfo {
                start_offset: 0,
                end_offset: 10,
                covered: true,
            },
            CoverageInfo {
                start_offset: 3,
                end_offset: 6,
                covered: false,
            },
        ];
        let painted = paint(ranges, 10);
        let expected: Vec<bool> = (0..10).map(|i| !(3..6).contains(&i)).collect();
        assert_eq!(painted, expected);
    }

    #[test]
    fn flatten_rejects_out_of_bounds_ranges() {
        let script = ScriptCoverage {
            script_id: "1".to_string(),
            url: "file://a.js".to_string(),
            functions: vec![FunctionCoverage {
                function_name: "f".to_string(),
                ranges: vec![CoverageRange {
                    start_offset: 0,
                    end_offset: 100,
                    count: 1,
                }],
                is_block_coverage: true,
            }],
        };
        let err = flatten(&script, 10).unwrap_err();
        assert!(matches!(err, CollectError::InvalidCoverageEntry(_)));
    }

    #[test]
    fn sdk_sentinel_sources_are_skipped() {
        // A one-line compiled script whose single source-map token points at
        // an SDK-internal source; lowering should contribute nothing.
        let compiled = "x();";
        let mut builder = sourcemap::SourceMapBuilder::new(None);
        let src_id = builder.add_source(&format!("{SDK_SENTINEL_PREFIX}core.dart"));
        builder.add_raw(0, 0, 0, 0, Some(src_id), None, false);
        let map = builder.into_sourcemap();

        let script = ScriptCoverage {
            script_id: "1".to_string(),
            url: "file://compiled.js".to_string(),
            functions: vec![FunctionCoverage {
                function_name: "x".to_string(),
                ranges: vec![CoverageRange {
                    start_offset: 0,
                    end_offset: compiled.len(),
                    count: 1,
                }],
                is_block_coverage: true,
            }],
        };

        let result = lower_script(&script, compiled, &map, |url, _| Some(url.to_string())).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn lower_all_resolves_a_whole_script_batch() {
        use std::cell::RefCell;
        use std::collections::BTreeMap;

        use test_utils::fixtures::SAMPLE_COMPILED_JS;

        let compiled = SAMPLE_COMPILED_JS;
        let mut builder = sourcemap::SourceMapBuilder::new(None);
        let src_id = builder.add_source("original.js");
        builder.add_raw(0, 0, 0, 0, Some(src_id), None, false);
        let map = RefCell::new(Some(builder.into_sourcemap()));

        let script = ScriptCoverage {
            script_id: "1".to_string(),
            url: "file://compiled.js".to_string(),
            functions: vec![FunctionCoverage {
                function_name: "f".to_string(),
                ranges: vec![CoverageRange {
                    start_offset: 0,
                    end_offset: compiled.len(),
                    count: 1,
                }],
                is_block_coverage: true,
            }],
        };

        let result = lower_all(
            &[script],
            |_| Some(compiled.to_string()),
            |_| map.borrow_mut().take(),
            |url, _| Some(format!("file:///{url}")),
        )
        .unwrap();

        assert_eq!(
            result["file:///original.js"].line_hits,
            BTreeMap::from([(1, 1)])
        );
    }
}
