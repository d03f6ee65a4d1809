//! Small, hand-written sample sources/source-maps used across this crate's
//! and `covcollect-core`'s test suites, kept here rather than duplicated in
//! every test module that needs one. Unlike this crate's previous fixture
//! set, these are inline strings rather than on-disk Git LFS blobs — small
//! enough that checking them in directly is simpler than the alternative.

/// A tiny Dart-flavored source file with one ignored line, one ignored
/// region, and two coverable statements, for ignore-scanner and merge
/// tests.
pub const SAMPLE_DART_SOURCE: &str = "\
void main() {
  greet('world'); // coverage:ignore-line
  // coverage:ignore-start
  debugDump();
  // coverage:ignore-end
  print('done');
}
";

/// A tiny compiled (bundled/minified) JS source, for browser-coverage
/// lowering tests that need a `ScriptCoverage` + source map pair rather than
/// a VM-Service source report.
pub const SAMPLE_COMPILED_JS: &str = "function f(){}";

/// A minimal on-disk `CodeCoverage` envelope (spec.md §6), for `merge`/`report`
/// CLI tests that need a file on disk rather than an in-memory `CoverageMap`.
pub fn sample_disk_coverage_json(source: &str) -> serde_json::Value {
    serde_json::json!({
        "type": "CodeCoverage",
        "coverage": [{
            "source": source,
            "script": {
                "type": "@Script",
                "fixedId": true,
                "id": format!("libraries/{source}"),
                "uri": source,
                "_kind": "library",
            },
            "hits": [1, 1, 2, 0, 3, 2],
        }],
    })
}
