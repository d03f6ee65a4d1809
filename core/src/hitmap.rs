//! Canonical per-file coverage representation (the "hit map"), its merge and
//! ignore-masking algebra, and its JSON interchange format.
//!
//! A [`HitMap`] never special-cases "this line is a branch target" vs "this
//! line is a plain statement" — it just tracks four independent, line-keyed
//! counters. [`CoverageMap`] (a `BTreeMap` keyed by absolute source URI) is
//! the "report" unit everything else in this crate passes around; `BTreeMap`
//! gives us sorted-ascending iteration for free, which both the JSON and
//! LCOV serializers depend on.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::{CollectError, Result};

pub type Line = u32;

/// A 1-based `(line, column)` position. Used by the browser-coverage lowerer
/// (`crate::browser`) to key compiled-source offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

/// Canonical per-source-file coverage record.
///
/// Invariants (spec.md §3): every key in `func_hits` is a key in
/// `func_names` and vice versa; every key in `func_hits` is present in
/// `line_hits`. These aren't enforced by the type itself (callers build
/// `func_hits`/`func_names` in lockstep) but `debug_assert_invariants` checks
/// them and is wired into the collector's tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitMap {
    pub line_hits: BTreeMap<Line, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub func_hits: Option<BTreeMap<Line, u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub func_names: Option<BTreeMap<Line, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch_hits: Option<BTreeMap<Line, u64>>,
}

impl HitMap {
    #[cfg(test)]
    pub(crate) fn debug_assert_invariants(&self) {
        if let (Some(hits), Some(names)) = (&self.func_hits, &self.func_names) {
            assert_eq!(
                hits.keys().collect::<Vec<_>>(),
                names.keys().collect::<Vec<_>>(),
                "func_hits and func_names must share keys"
            );
        }
        if let Some(hits) = &self.func_hits {
            for line in hits.keys() {
                assert!(
                    self.line_hits.contains_key(line),
                    "func_hits line {line} missing from line_hits"
                );
            }
        }
    }

    /// Merges `other` into `self` in place: line-wise addition for
    /// `line_hits`/`func_hits`/`branch_hits` (absent entries on either side
    /// count as zero), and a union for `func_names` that fails if the two
    /// sides disagree about the name of the same declaration line.
    pub fn merge_in(&mut self, other: HitMap) -> Result<()> {
        merge_counts(&mut self.line_hits, other.line_hits);
        merge_optional_counts(&mut self.func_hits, other.func_hits);
        merge_optional_counts(&mut self.branch_hits, other.branch_hits);
        merge_func_names(&mut self.func_names, other.func_names)?;
        Ok(())
    }

    /// Deletes any `ignored` line from every counter map. Used to mask out
    /// `// coverage:ignore-line`/`-start`/`-end` regions before a hit map is
    /// merged into a report or serialized.
    pub fn apply_ignores(&mut self, ignored: &BTreeSet<Line>) {
        self.line_hits.retain(|line, _| !ignored.contains(line));
        if let Some(hits) = self.func_hits.as_mut() {
            hits.retain(|line, _| !ignored.contains(line));
        }
        if let Some(names) = self.func_names.as_mut() {
            names.retain(|line, _| !ignored.contains(line));
        }
        if let Some(hits) = self.branch_hits.as_mut() {
            hits.retain(|line, _| !ignored.contains(line));
        }
    }
}

fn merge_counts(into: &mut BTreeMap<Line, u64>, from: BTreeMap<Line, u64>) {
    for (line, count) in from {
        *into.entry(line).or_insert(0) += count;
    }
}

fn merge_optional_counts(into: &mut Option<BTreeMap<Line, u64>>, from: Option<BTreeMap<Line, u64>>) {
    match (into.as_mut(), from) {
        (Some(existing), Some(incoming)) => merge_counts(existing, incoming),
        (None, Some(incoming)) => *into = Some(incoming),
        (_, None) => {}
    }
}

fn merge_func_names(
    into: &mut Option<BTreeMap<Line, String>>,
    from: Option<BTreeMap<Line, String>>,
) -> Result<()> {
    match (into.as_mut(), from) {
        (Some(existing), Some(incoming)) => {
            for (line, name) in incoming {
                match existing.get(&line) {
                    Some(current) if *current != name => {
                        return Err(CollectError::InconsistentFunctionName {
                            line,
                            existing: current.clone(),
                            incoming: name,
                        });
                    }
                    Some(_) => {}
                    None => {
                        existing.insert(line, name);
                    }
                }
            }
        }
        (None, Some(incoming)) => *into = Some(incoming),
        (_, None) => {}
    }
    Ok(())
}

/// A full coverage report: every hit map keyed by its absolute source URI.
/// Per spec.md §3 invariant (iii), a URI appears at most once.
pub type CoverageMap = BTreeMap<String, HitMap>;

/// Merges every entry of `from` into `into`. Whole records move over when
/// `into` has no prior entry for that URI; otherwise they're combined with
/// [`HitMap::merge_in`]. Associative and has `CoverageMap::new()` as its
/// identity (see `hitmap::tests::merge_is_associative`).
pub fn merge(into: &mut CoverageMap, from: CoverageMap) -> Result<()> {
    for (uri, hit_map) in from {
        match into.get_mut(&uri) {
            Some(existing) => existing.merge_in(hit_map)?,
            None => {
                into.insert(uri, hit_map);
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------
// Ignore-directive scanner
// ---------------------------------------------------------------------

const IGNORE_LINE: &str = "coverage:ignore-line";
const IGNORE_START: &str = "coverage:ignore-start";
const IGNORE_END: &str = "coverage:ignore-end";

/// Scans source lines (1-based numbering implied by position) for
/// `// coverage:ignore-line`/`-start`/`-end` markers and returns the set of
/// lines they cover. Matching is purely textual (substring, case-sensitive,
/// anywhere in the line) — no attempt is made to avoid matching inside
/// string literals or other comments.
///
/// An unterminated `ignore-start` (no matching `-end` before EOF) extends to
/// the end of the file, per spec.md §3.
pub fn ignored_lines<S: AsRef<str>>(lines: &[S]) -> BTreeSet<Line> {
    let mut out = BTreeSet::new();
    let mut skipping = false;
    for (idx, line) in lines.iter().enumerate() {
        let line_no = (idx + 1) as Line;
        let text = line.as_ref();
        if skipping {
            out.insert(line_no);
            if text.contains(IGNORE_END) {
                skipping = false;
            }
            continue;
        }
        if text.contains(IGNORE_START) {
            skipping = true;
            continue;
        }
        if text.contains(IGNORE_LINE) {
            out.insert(line_no);
        }
    }
    out
}

// ---------------------------------------------------------------------
// JSON interchange format
// ---------------------------------------------------------------------

/// One entry of the core JSON interchange format (spec.md §4.1/§6): `hits`
/// (and, when present, `func_hits`/`func_names`/`branch_hits`) is a flat
/// array alternating keys and values, where a key is either a line number or
/// an inclusive `"a-b"` range string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonCoverageEntry {
    pub source: String,
    pub hits: Vec<serde_json::Value>,
    #[serde(rename = "funcHits", default, skip_serializing_if = "Option::is_none")]
    pub func_hits: Option<Vec<serde_json::Value>>,
    #[serde(rename = "funcNames", default, skip_serializing_if = "Option::is_none")]
    pub func_names: Option<Vec<serde_json::Value>>,
    #[serde(rename = "branchHits", default, skip_serializing_if = "Option::is_none")]
    pub branch_hits: Option<Vec<serde_json::Value>>,
}

fn expand_key(key: &serde_json::Value) -> Result<Vec<Line>> {
    if let Some(n) = key.as_u64() {
        return Ok(vec![n as Line]);
    }
    if let Some(s) = key.as_str() {
        if let Some((start, end)) = s.split_once('-') {
            let start: Line = start
                .parse()
                .map_err(|_| CollectError::InvalidCoverageEntry(format!("bad range key '{s}'")))?;
            let end: Line = end
                .parse()
                .map_err(|_| CollectError::InvalidCoverageEntry(format!("bad range key '{s}'")))?;
            return Ok((start..=end).collect());
        }
    }
    Err(CollectError::InvalidCoverageEntry(format!(
        "hit key must be a number or \"a-b\" range string, got {key}"
    )))
}

/// Decodes a flat `[key, count, key, count, ...]` array into a line->count
/// map, expanding range keys and accumulating repeated lines by addition.
/// Lines in `ignored` are dropped — note this checks the *expanded* line,
/// not the raw range-key string, which is the one place the original
/// dart-lang/coverage implementation this spec is based on gets it wrong
/// (spec.md §9).
fn decode_flat_counts(flat: &[serde_json::Value], ignored: &BTreeSet<Line>) -> Result<BTreeMap<Line, u64>> {
    if flat.len() % 2 != 0 {
        return Err(CollectError::InvalidCoverageEntry(
            "hits array must have an even number of elements".into(),
        ));
    }
    let mut out = BTreeMap::new();
    for pair in flat.chunks_exact(2) {
        let count = pair[1]
            .as_u64()
            .ok_or_else(|| CollectError::InvalidCoverageEntry(format!("non-numeric count {}", pair[1])))?;
        for line in expand_key(&pair[0])? {
            if ignored.contains(&line) {
                continue;
            }
            *out.entry(line).or_insert(0) += count;
        }
    }
    Ok(out)
}

fn decode_flat_names(flat: &[serde_json::Value], ignored: &BTreeSet<Line>) -> Result<BTreeMap<Line, String>> {
    if flat.len() % 2 != 0 {
        return Err(CollectError::InvalidCoverageEntry(
            "func_names array must have an even number of elements".into(),
        ));
    }
    let mut out = BTreeMap::new();
    for pair in flat.chunks_exact(2) {
        let name = pair[1]
            .as_str()
            .ok_or_else(|| CollectError::InvalidCoverageEntry(format!("non-string func name {}", pair[1])))?
            .to_string();
        for line in expand_key(&pair[0])? {
            if ignored.contains(&line) {
                continue;
            }
            out.insert(line, name.clone());
        }
    }
    Ok(out)
}

fn flatten_counts(map: &BTreeMap<Line, u64>) -> Vec<serde_json::Value> {
    let mut out = Vec::with_capacity(map.len() * 2);
    for (line, count) in map {
        out.push(serde_json::Value::from(*line));
        out.push(serde_json::Value::from(*count));
    }
    out
}

fn flatten_names(map: &BTreeMap<Line, String>) -> Vec<serde_json::Value> {
    let mut out = Vec::with_capacity(map.len() * 2);
    for (line, name) in map {
        out.push(serde_json::Value::from(*line));
        out.push(serde_json::Value::from(name.clone()));
    }
    out
}

/// Parses a list of [`JsonCoverageEntry`] into a [`CoverageMap`].
///
/// `resolve_source` maps each entry's raw `source` field to an absolute URI;
/// entries for which it returns `None` are dropped (spec.md §4.1: "Entries
/// with no resolvable source are skipped"). `ignored_lines` carries
/// per-resolved-URI line sets (e.g. from [`ignored_lines`]) and is applied
/// before insertion, not after.
pub fn from_json(
    entries: &[JsonCoverageEntry],
    resolve_source: impl Fn(&str) -> Option<String>,
    ignored_lines: &HashMap<String, BTreeSet<Line>>,
) -> Result<CoverageMap> {
    let mut map = CoverageMap::new();
    let empty = BTreeSet::new();
    for entry in entries {
        let Some(uri) = resolve_source(&entry.source) else {
            continue;
        };
        let ignored = ignored_lines.get(&uri).unwrap_or(&empty);
        let hit_map = HitMap {
            line_hits: decode_flat_counts(&entry.hits, ignored)?,
            func_hits: entry
                .func_hits
                .as_deref()
                .map(|f| decode_flat_counts(f, ignored))
                .transpose()?,
            func_names: entry
                .func_names
                .as_deref()
                .map(|f| decode_flat_names(f, ignored))
                .transpose()?,
            branch_hits: entry
                .branch_hits
                .as_deref()
                .map(|f| decode_flat_counts(f, ignored))
                .transpose()?,
        };
        match map.get_mut(&uri) {
            Some(existing) => existing.merge_in(hit_map)?,
            None => {
                map.insert(uri, hit_map);
            }
        }
    }
    Ok(map)
}

/// Inverse of [`from_json`] for a single file: line keys sorted ascending,
/// always emitted as single-line keys (never range-compressed) so that
/// output is deterministic.
pub fn to_json_entry(source: &str, hit_map: &HitMap) -> JsonCoverageEntry {
    JsonCoverageEntry {
        source: source.to_string(),
        hits: flatten_counts(&hit_map.line_hits),
        func_hits: hit_map.func_hits.as_ref().map(flatten_counts),
        func_names: hit_map.func_names.as_ref().map(flatten_names),
        branch_hits: hit_map.branch_hits.as_ref().map(flatten_counts),
    }
}

pub fn to_json(map: &CoverageMap) -> Vec<JsonCoverageEntry> {
    map.iter().map(|(uri, hm)| to_json_entry(uri, hm)).collect()
}

/// Builds a line-only [`JsonCoverageEntry`] straight from a line->count map,
/// for callers (like the browser-coverage lowerer) that never produce
/// function/branch data.
pub fn to_script_coverage_json(uri: &str, line_hits: &BTreeMap<Line, u64>) -> JsonCoverageEntry {
    JsonCoverageEntry {
        source: uri.to_string(),
        hits: flatten_counts(line_hits),
        func_hits: None,
        func_names: None,
        branch_hits: None,
    }
}

// ---------------------------------------------------------------------
// On-disk envelope (spec.md §6)
// ---------------------------------------------------------------------

/// The full on-disk JSON format used to accumulate coverage across runs.
/// Unlike [`JsonCoverageEntry`], each entry also carries an opaque `script`
/// metadata blob; we don't interpret it beyond round-tripping it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskCoverageFile {
    #[serde(rename = "type")]
    pub kind: String,
    pub coverage: Vec<DiskCoverageEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskCoverageEntry {
    pub source: String,
    pub script: serde_json::Value,
    pub hits: Vec<serde_json::Value>,
    #[serde(rename = "funcHits", default, skip_serializing_if = "Option::is_none")]
    pub func_hits: Option<Vec<serde_json::Value>>,
    #[serde(rename = "funcNames", default, skip_serializing_if = "Option::is_none")]
    pub func_names: Option<Vec<serde_json::Value>>,
    #[serde(rename = "branchHits", default, skip_serializing_if = "Option::is_none")]
    pub branch_hits: Option<Vec<serde_json::Value>>,
}

fn synthetic_script_meta(uri: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "@Script",
        "fixedId": true,
        "id": format!("libraries/{uri}"),
        "uri": uri,
        "_kind": "library",
    })
}

pub fn to_disk_format(map: &CoverageMap) -> DiskCoverageFile {
    DiskCoverageFile {
        kind: "CodeCoverage".to_string(),
        coverage: map
            .iter()
            .map(|(uri, hm)| {
                let entry = to_json_entry(uri, hm);
                DiskCoverageEntry {
                    source: entry.source,
                    script: synthetic_script_meta(uri),
                    hits: entry.hits,
                    func_hits: entry.func_hits,
                    func_names: entry.func_names,
                    branch_hits: entry.branch_hits,
                }
            })
            .collect(),
    }
}

pub fn from_disk_format(
    file: &DiskCoverageFile,
    resolve_source: impl Fn(&str) -> Option<String>,
    ignored_lines: &HashMap<String, BTreeSet<Line>>,
) -> Result<CoverageMap> {
    let entries: Vec<JsonCoverageEntry> = file
        .coverage
        .iter()
        .map(|e| JsonCoverageEntry {
            source: e.source.clone(),
            hits: e.hits.clone(),
            func_hits: e.func_hits.clone(),
            func_names: e.func_names.clone(),
            branch_hits: e.branch_hits.clone(),
        })
        .collect();
    from_json(&entries, resolve_source, ignored_lines)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_only(pairs: &[(Line, u64)]) -> HitMap {
        HitMap {
            line_hits: pairs.iter().copied().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn from_disk_format_decodes_the_sample_fixture() {
        let json = test_utils::fixtures::sample_disk_coverage_json("lib/a.dart");
        let file: DiskCoverageFile = serde_json::from_value(json).unwrap();

        let map = from_disk_format(&file, |source| Some(source.to_string()), &HashMap::new()).unwrap();

        assert_eq!(
            map["lib/a.dart"].line_hits,
            BTreeMap::from([(1, 1), (2, 0), (3, 2)])
        );
    }

    #[test]
    fn merge_is_identity_and_associative() {
        let a = CoverageMap::from([("a.rs".to_string(), line_only(&[(1, 1)]))]);
        let b = CoverageMap::from([("a.rs".to_string(), line_only(&[(1, 2)]))]);
        let c = CoverageMap::from([("b.rs".to_string(), line_only(&[(5, 1)]))]);

        let mut left = a.clone();
        merge(&mut left, CoverageMap::new()).unwrap();
        assert_eq!(left, a);

        let mut bc = b.clone();
        merge(&mut bc, c.clone()).unwrap();
        let mut a_bc = a.clone();
        merge(&mut a_bc, bc).unwrap();

        let mut ab = a.clone();
        merge(&mut ab, b.clone()).unwrap();
        let mut ab_c = ab;
        merge(&mut ab_c, c).unwrap();

        assert_eq!(a_bc, ab_c);
    }

    /// spec.md §8.1's associativity property, checked against randomly
    /// generated maps rather than the one hand-built triple above: a seeded
    /// `test_utils::rng` fixture drives which URIs/lines/counts appear in
    /// each of `a`/`b`/`c` so failures are reproducible by seed.
    #[test]
    fn merge_is_associative_for_random_maps() {
        use rand::Rng;

        fn random_line_hits(rng: &mut impl Rng, lines: Line) -> BTreeMap<Line, u64> {
            (1..=lines)
                .filter(|_| rng.gen_bool(0.7))
                .map(|line| (line, rng.gen_range(0..5)))
                .collect()
        }

        fn random_map(rng: &mut impl Rng, uris: &[&str], lines: Line) -> CoverageMap {
            uris.iter()
                .filter(|_| rng.gen_bool(0.8))
                .map(|&uri| {
                    (
                        uri.to_string(),
                        HitMap {
                            line_hits: random_line_hits(rng, lines),
                            ..Default::default()
                        },
                    )
                })
                .collect()
        }

        let uris = ["a.rs", "b.rs", "c.rs", "d.rs"];
        for seed in 0..20u64 {
            test_utils::rng::set_seed(seed);
            assert_eq!(test_utils::rng::get_seed(), seed);
            let mut rng = test_utils::rng::rng();

            let a = random_map(&mut rng, &uris, 6);
            let b = random_map(&mut rng, &uris, 6);
            let c = random_map(&mut rng, &uris, 6);

            let mut bc = b.clone();
            merge(&mut bc, c.clone()).unwrap();
            let mut a_then_bc = a.clone();
            merge(&mut a_then_bc, bc).unwrap();

            let mut ab = a;
            merge(&mut ab, b).unwrap();
            merge(&mut ab, c).unwrap();

            assert_eq!(a_then_bc, ab, "merge was not associative for seed {seed}");
        }
    }

    #[test]
    fn merge_inconsistent_function_name_fails() {
        let mut a = HitMap {
            line_hits: BTreeMap::from([(1, 1)]),
            func_hits: Some(BTreeMap::from([(1, 1)])),
            func_names: Some(BTreeMap::from([(1, "foo".to_string())])),
            branch_hits: None,
        };
        let b = HitMap {
            line_hits: BTreeMap::from([(1, 1)]),
            func_hits: Some(BTreeMap::from([(1, 1)])),
            func_names: Some(BTreeMap::from([(1, "bar".to_string())])),
            branch_hits: None,
        };
        let err = a.merge_in(b).unwrap_err();
        assert!(matches!(err, CollectError::InconsistentFunctionName { .. }));
    }

    #[test]
    fn s1_ignore_directives() {
        // 5-line source; line 2 is ignored.
        let ignored = BTreeSet::from([2]);
        let entry = JsonCoverageEntry {
            source: "a.rs".to_string(),
            hits: vec![1.into(), 3.into(), 2.into(), 5.into(), 3.into(), 1.into()],
            func_hits: None,
            func_names: None,
            branch_hits: None,
        };
        let ignored_lines = HashMap::from([("a.rs".to_string(), ignored)]);
        let map = from_json(&[entry], |s| Some(s.to_string()), &ignored_lines).unwrap();
        let hm = &map["a.rs"];
        assert_eq!(hm.line_hits, BTreeMap::from([(1, 3), (3, 1)]));
    }

    #[test]
    fn s2_range_expansion() {
        let entry = JsonCoverageEntry {
            source: "a.rs".to_string(),
            hits: vec!["2-4".into(), 7.into(), 5.into(), 1.into()],
            func_hits: None,
            func_names: None,
            branch_hits: None,
        };
        let map = from_json(&[entry], |s| Some(s.to_string()), &HashMap::new()).unwrap();
        let hm = &map["a.rs"];
        assert_eq!(hm.line_hits, BTreeMap::from([(2, 7), (3, 7), (4, 7), (5, 1)]));
    }

    #[test]
    fn s3_merge_accumulation() {
        let e1 = JsonCoverageEntry {
            source: "a.rs".to_string(),
            hits: vec![1.into(), 2.into()],
            func_hits: None,
            func_names: None,
            branch_hits: None,
        };
        let e2 = JsonCoverageEntry {
            source: "a.rs".to_string(),
            hits: vec![1.into(), 3.into(), 2.into(), 1.into()],
            func_hits: None,
            func_names: None,
            branch_hits: None,
        };
        let map = from_json(&[e1, e2], |s| Some(s.to_string()), &HashMap::new()).unwrap();
        let hm = &map["a.rs"];
        assert_eq!(hm.line_hits, BTreeMap::from([(1, 5), (2, 1)]));
    }

    #[test]
    fn json_round_trip_without_ranges() {
        let hm = HitMap {
            line_hits: BTreeMap::from([(1, 1), (2, 0), (3, 2)]),
            func_hits: Some(BTreeMap::from([(1, 1)])),
            func_names: Some(BTreeMap::from([(1, "main".to_string())])),
            branch_hits: None,
        };
        let entry = to_json_entry("a.rs", &hm);
        let map = from_json(&[entry], |s| Some(s.to_string()), &HashMap::new()).unwrap();
        assert_eq!(map["a.rs"], hm);
    }

    #[test]
    fn unresolved_source_is_dropped() {
        let entry = JsonCoverageEntry {
            source: "dart:core".to_string(),
            hits: vec![1.into(), 1.into()],
            func_hits: None,
            func_names: None,
            branch_hits: None,
        };
        let map = from_json(&[entry], |_| None, &HashMap::new()).unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn ignore_scanner_regions_and_single_lines() {
        let lines = [
            "fn main() {",                 // 1
            "    // coverage:ignore-start", // 2
            "    risky();",                 // 3
            "    // coverage:ignore-end",   // 4
            "    safe(); // coverage:ignore-line", // 5
            "}",                             // 6
        ];
        let ignored = ignored_lines(&lines);
        assert_eq!(ignored, BTreeSet::from([3, 4, 5]));
    }

    #[test]
    fn ignore_scanner_unterminated_region_runs_to_eof() {
        let lines = ["a", "// coverage:ignore-start", "b", "c"];
        let ignored = ignored_lines(&lines);
        assert_eq!(ignored, BTreeSet::from([3, 4]));
    }
}
