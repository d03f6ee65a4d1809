//! The main collection sequence (spec.md §4.3, "Main sequence (`collect`)").

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{CollectError, Result};
use crate::hitmap::{self, CoverageMap, HitMap, Line};
use crate::vmservice::types::{
    Isolate, IsolateRef, PauseEventKind, Script, SourceReport, SourceReportKind, SourceReportParams, VmInfo,
};
use crate::vmservice::version::Capabilities;
use crate::vmservice::VmService;

const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Per-script-URI set of lines already known to be coverable, threaded
/// across successive [`collect`] calls so unchanged libraries don't need to
/// be recompiled to learn their coverable line set again (spec.md §3).
pub type CoverableLineCache = HashMap<String, BTreeSet<Line>>;

/// Serializes a [`CoverableLineCache`] as `{ scriptUri: [line, ...], ... }`,
/// sorted ascending within each entry since `BTreeSet` iterates that way.
/// Lets a CLI persist the cache to a `--cache-file` across repeated
/// `collect` invocations against the same running program.
pub fn cache_to_json(cache: &CoverableLineCache) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = cache
        .iter()
        .map(|(uri, lines)| (uri.clone(), serde_json::Value::from(lines.iter().copied().collect::<Vec<_>>())))
        .collect();
    serde_json::Value::Object(map)
}

/// Inverse of [`cache_to_json`].
pub fn cache_from_json(value: &serde_json::Value) -> Result<CoverableLineCache> {
    let object = value
        .as_object()
        .ok_or_else(|| CollectError::InvalidCoverageEntry("coverable-line cache must be a JSON object".into()))?;
    let mut cache = CoverableLineCache::new();
    for (uri, lines) in object {
        let lines = lines
            .as_array()
            .ok_or_else(|| CollectError::InvalidCoverageEntry(format!("cache entry for '{uri}' must be an array")))?;
        let mut set = BTreeSet::new();
        for line in lines {
            let line = line
                .as_u64()
                .ok_or_else(|| CollectError::InvalidCoverageEntry(format!("non-numeric cache line in '{uri}'")))?;
            set.insert(line as Line);
        }
        cache.insert(uri.clone(), set);
    }
    Ok(cache)
}

#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// If non-empty, only these isolates are visited (after group dedup).
    pub isolate_ids: Option<HashSet<String>>,
    /// Top-level package names to retain coverage for; empty means "all".
    pub scoped_output: Vec<String>,
    pub function_coverage: bool,
    pub branch_coverage: bool,
    /// Whether `dart:`-scheme (SDK) sources are retained. Named
    /// `include_sdk_sources` rather than spec.md's `includeDart` since this
    /// core is meant to generalize past one runtime family (SPEC_FULL.md §4,
    /// Open Questions).
    pub include_sdk_sources: bool,
    pub wait_paused: bool,
    pub resume_isolates: bool,
    pub timeout: Duration,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            isolate_ids: None,
            scoped_output: Vec::new(),
            function_coverage: false,
            branch_coverage: false,
            include_sdk_sources: false,
            wait_paused: true,
            resume_isolates: false,
            timeout: Duration::from_secs(60),
        }
    }
}

/// Runs the full collection sequence against `service` and always disposes
/// it afterward, success or failure (spec.md §4.3 step 5 / §5 "Resource
/// discipline").
pub async fn collect(
    service: &dyn VmService,
    config: &CollectorConfig,
    cache: Option<&mut CoverableLineCache>,
) -> Result<CoverageMap> {
    let result = collect_inner(service, config, cache).await;
    if let Err(err) = service.dispose().await {
        warn!(%err, "failed to dispose VM service handle");
    }
    result
}

async fn collect_inner(
    service: &dyn VmService,
    config: &CollectorConfig,
    mut cache: Option<&mut CoverableLineCache>,
) -> Result<CoverageMap> {
    let version = service.get_version().await?;
    let capabilities = Capabilities::from_version(version);

    let start = Instant::now();
    if config.wait_paused {
        wait_for_all_paused(service, remaining(config.timeout, start)).await?;
    }

    let vm = service.get_vm().await?;
    if vm.isolates.is_empty() {
        return Err(CollectError::NoIsolates);
    }

    let group_of = isolate_group_map(service, &vm, capabilities.fast_iso_groups).await?;
    let mut covered_groups: HashSet<String> = HashSet::new();
    let mut result = CoverageMap::new();
    let mut visited: Vec<(String, Option<PauseEventKind>)> = Vec::new();

    for isolate_ref in &vm.isolates {
        if let Some(group_id) = group_of.get(&isolate_ref.id) {
            if !covered_groups.insert(group_id.clone()) {
                debug!(isolate = %isolate_ref.id, group = %group_id, "skipping isolate, group already covered");
                continue;
            }
        }
        if let Some(allow_list) = &config.isolate_ids {
            if !allow_list.contains(&isolate_ref.id) {
                continue;
            }
        }

        match collect_one_isolate(service, isolate_ref, config, &capabilities, cache.as_deref_mut()).await {
            Ok(Some((partial, pause_kind))) => {
                hitmap::merge(&mut result, partial)?;
                visited.push((isolate_ref.id.clone(), pause_kind));
            }
            Ok(None) => {}
            Err(CollectError::StaleIsolate(id)) => {
                debug!(isolate = %id, "isolate went stale mid-collection, skipping");
            }
            Err(err) => return Err(err),
        }
    }

    if config.resume_isolates {
        resume_all(service, &visited).await;
    }

    Ok(result)
}

fn remaining(total: Duration, since: Instant) -> Duration {
    total.saturating_sub(since.elapsed())
}

/// Polls every 200ms until every isolate in `getVM()`'s isolate list reports
/// a "paused" `pauseEvent.kind` (spec.md §4.3 step 1).
async fn wait_for_all_paused(service: &dyn VmService, timeout: Duration) -> Result<()> {
    let start = Instant::now();
    loop {
        let vm = service.get_vm().await?;
        if vm.isolates.is_empty() {
            return Err(CollectError::NoIsolates);
        }

        let mut all_paused = true;
        for isolate_ref in &vm.isolates {
            let isolate = service.get_isolate(&isolate_ref.id).await?;
            let paused = isolate
                .pause_event
                .map(|event| event.kind.is_paused())
                .unwrap_or(false);
            if !paused {
                all_paused = false;
                break;
            }
        }
        if all_paused {
            return Ok(());
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            return Err(CollectError::PauseTimeout {
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }
        tokio::time::sleep(PAUSE_POLL_INTERVAL).await;
    }
}

/// Builds the isolate-id -> isolate-group-id map. When `fastIsoGroups` is
/// supported, each `IsolateRef` already carries its group id directly;
/// otherwise every group in `VM.isolateGroups` is fetched with
/// `getIsolateGroup` to learn its membership (spec.md §4.3 step 2).
async fn isolate_group_map(
    service: &dyn VmService,
    vm: &VmInfo,
    fast_iso_groups: bool,
) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();
    if fast_iso_groups {
        for isolate_ref in &vm.isolates {
            if let Some(group_id) = &isolate_ref.isolate_group_id {
                map.insert(isolate_ref.id.clone(), group_id.clone());
            }
        }
    } else {
        for group_ref in &vm.isolate_groups {
            let group = service.get_isolate_group(&group_ref.id).await?;
            for isolate_ref in &group.isolates {
                map.insert(isolate_ref.id.clone(), group.id.clone());
            }
        }
    }
    Ok(map)
}

/// Collects one already-selected (not deduplicated-away) isolate: works out
/// the per-script or whole-isolate source-report path, processes the
/// report(s), and returns the partial coverage contribution plus the
/// isolate's pause-event kind (for the later resume pass). Returns `Ok(None)`
/// if the isolate is excluded by the caller's allow-list higher up; callers
/// filter that before calling this function, so in practice this always
/// returns `Some` or an error.
async fn collect_one_isolate(
    service: &dyn VmService,
    isolate_ref: &IsolateRef,
    config: &CollectorConfig,
    capabilities: &Capabilities,
    mut cache: Option<&mut CoverableLineCache>,
) -> Result<Option<(CoverageMap, Option<PauseEventKind>)>> {
    let isolate = service.get_isolate(&isolate_ref.id).await?;
    let pause_kind = isolate.pause_event.as_ref().map(|e| e.kind);

    let mut kinds = vec![SourceReportKind::Coverage];
    if config.branch_coverage {
        if capabilities.branch_coverage {
            kinds.push(SourceReportKind::BranchCoverage);
        } else {
            warn!("branch coverage requested but unsupported by this VM Service version; downgrading");
        }
    }

    let mut partial = CoverageMap::new();

    let use_per_script = !config.scoped_output.is_empty() && !capabilities.library_filters;
    if use_per_script {
        let scripts = service.get_scripts(&isolate.id).await?;
        for script in scripts.iter().filter(|s| includes_script(&s.uri, &config.scoped_output)) {
            let already_compiled = already_compiled_libraries(capabilities, cache.as_deref());
            let params = SourceReportParams {
                force_compile: true,
                report_lines: true,
                script_id: Some(script.id.clone()),
                library_filters: None,
                libraries_already_compiled: already_compiled,
            };
            match service.get_source_report(&isolate.id, &kinds, params).await {
                Ok(report) => {
                    let fragment =
                        process_source_report(service, &isolate, &report, config, cache.as_deref_mut()).await?;
                    hitmap::merge(&mut partial, fragment)?;
                }
                Err(CollectError::StaleIsolate(id)) => {
                    debug!(script = %script.uri, isolate = %id, "stale during per-script source report, skipping");
                }
                Err(err) => return Err(err),
            }
        }
    } else {
        let library_filters = if capabilities.library_filters && !config.scoped_output.is_empty() {
            Some(
                config
                    .scoped_output
                    .iter()
                    .map(|pkg| format!("package:{pkg}/"))
                    .collect(),
            )
        } else {
            None
        };
        let already_compiled = already_compiled_libraries(capabilities, cache.as_deref());
        let params = SourceReportParams {
            force_compile: true,
            report_lines: true,
            script_id: None,
            library_filters,
            libraries_already_compiled: already_compiled,
        };
        match service.get_source_report(&isolate.id, &kinds, params).await {
            Ok(report) => {
                partial = process_source_report(service, &isolate, &report, config, cache.as_deref_mut()).await?;
            }
            Err(CollectError::StaleIsolate(id)) => {
                debug!(isolate = %id, "stale during whole-isolate source report, skipping");
            }
            Err(err) => return Err(err),
        }
    }

    Ok(Some((partial, pause_kind)))
}

fn already_compiled_libraries(capabilities: &Capabilities, cache: Option<&CoverableLineCache>) -> Option<Vec<String>> {
    if !capabilities.line_cache {
        return None;
    }
    cache.map(|c| c.keys().cloned().collect())
}

/// Scope filter (spec.md §4.3, "Scope filter (`includesScript`)"): a script
/// is in scope if the scope set is empty (wildcard), or its URI has scheme
/// `package` and its first path segment names a scoped package.
pub fn includes_script(uri: &str, scope: &[String]) -> bool {
    if scope.is_empty() {
        return true;
    }
    let Some(rest) = uri.strip_prefix("package:") else {
        return false;
    };
    let first_segment = rest.split('/').next().unwrap_or("");
    scope.iter().any(|pkg| pkg == first_segment)
}

fn skip_script_uri(uri: &str, include_sdk_sources: bool) -> bool {
    uri.starts_with("evaluate:") || (!include_sdk_sources && uri.starts_with("dart:"))
}

/// Processes one `getSourceReport` response into a fresh [`CoverageMap`]
/// fragment (spec.md §4.3, "Source-report processing
/// (`processSourceReport`)"), optionally enriching it with function-level
/// names/hit counts.
async fn process_source_report(
    service: &dyn VmService,
    isolate: &Isolate,
    report: &SourceReport,
    config: &CollectorConfig,
    mut cache: Option<&mut CoverableLineCache>,
) -> Result<CoverageMap> {
    let mut fragment = CoverageMap::new();
    let mut seen_lines: HashMap<String, BTreeSet<Line>> = HashMap::new();

    for range in &report.ranges {
        let Some(script_uri) = report.script_uri(range.script_index) else {
            continue;
        };
        if !includes_script(script_uri, &config.scoped_output) {
            continue;
        }
        if skip_script_uri(script_uri, config.include_sdk_sources) {
            continue;
        }

        let hits = fragment.entry(script_uri.to_string()).or_insert_with(HitMap::default);

        if let Some(cached) = cache.as_deref().and_then(|c| c.get(script_uri)) {
            for &line in cached {
                hits.line_hits.entry(line).or_insert(0);
            }
        }

        if let Some(coverage) = &range.coverage {
            for &line in &coverage.hits {
                *hits.line_hits.entry(line).or_insert(0) += 1;
                seen_lines.entry(script_uri.to_string()).or_default().insert(line);
            }
            for &line in &coverage.misses {
                hits.line_hits.entry(line).or_insert(0);
                seen_lines.entry(script_uri.to_string()).or_default().insert(line);
            }
        }
        if let Some(branch) = &range.branch_coverage {
            let branch_hits = hits.branch_hits.get_or_insert_with(BTreeMap::new);
            for &line in &branch.hits {
                *branch_hits.entry(line).or_insert(0) += 1;
            }
            for &line in &branch.misses {
                branch_hits.entry(line).or_insert(0);
            }
        }
    }

    if let Some(cache) = cache.as_deref_mut() {
        for (uri, lines) in seen_lines {
            cache.entry(uri).or_default().extend(lines);
        }
    }

    if config.function_coverage {
        enrich_function_coverage(service, isolate, config, &mut fragment).await?;
    }

    for hit_map in fragment.values_mut() {
        finalize_function_hits(hit_map);
    }

    Ok(fragment)
}

fn finalize_function_hits(hit_map: &mut HitMap) {
    let Some(names) = &hit_map.func_names else {
        return;
    };
    let hits = hit_map.func_hits.get_or_insert_with(BTreeMap::new);
    for &line in names.keys() {
        hits.entry(line).or_insert(0);
    }
    for (&line, &count) in &hit_map.line_hits {
        if count > 0 {
            if let Some(entry) = hits.get_mut(&line) {
                *entry += count;
            }
        }
    }
}

/// Walks the isolate's library/class/function graph once per distinct
/// library, recording a `funcNames`/declaration-line entry for every
/// non-abstract, non-implicit function whose declaration line can be
/// resolved (spec.md §4.3, "Function coverage enrichment").
async fn enrich_function_coverage(
    service: &dyn VmService,
    isolate: &Isolate,
    config: &CollectorConfig,
    fragment: &mut CoverageMap,
) -> Result<()> {
    let mut script_cache: HashMap<String, Script> = HashMap::new();

    for library_ref in &isolate.libraries {
        if !includes_script(&library_ref.uri, &config.scoped_output) {
            continue;
        }
        if skip_script_uri(&library_ref.uri, config.include_sdk_sources) {
            continue;
        }

        let library = match service.get_library(&isolate.id, &library_ref.id).await {
            Ok(library) => library,
            Err(CollectError::StaleIsolate(id)) => {
                debug!(library = %library_ref.uri, isolate = %id, "stale while loading library, skipping");
                continue;
            }
            Err(err) => return Err(err),
        };

        let mut owned_funcs: Vec<(String, Option<String>)> = library
            .functions
            .iter()
            .map(|f| (f.id.clone(), None))
            .collect();
        for class_ref in &library.classes {
            let class = match service.get_class(&isolate.id, &class_ref.id).await {
                Ok(class) => class,
                Err(CollectError::StaleIsolate(id)) => {
                    debug!(class = %class_ref.name, isolate = %id, "stale while loading class, skipping");
                    continue;
                }
                Err(err) => return Err(err),
            };
            for func_ref in &class.functions {
                owned_funcs.push((func_ref.id.clone(), Some(class_ref.name.clone())));
            }
        }

        for (func_id, owner) in owned_funcs {
            let func = match service.get_function(&isolate.id, &func_id).await {
                Ok(func) => func,
                Err(CollectError::StaleIsolate(id)) => {
                    debug!(function = %func_id, isolate = %id, "stale while loading function, skipping");
                    continue;
                }
                Err(err) => return Err(err),
            };
            if func.is_abstract || func.is_implicit {
                continue;
            }
            let Some(location) = &func.location else {
                continue;
            };

            let script = match script_cache.get(&location.script.id) {
                Some(script) => script,
                None => {
                    let script = match service.get_script(&isolate.id, &location.script.id).await {
                        Ok(script) => script,
                        Err(CollectError::StaleIsolate(id)) => {
                            debug!(script = %location.script.uri, isolate = %id, "stale while loading script, skipping");
                            continue;
                        }
                        Err(err) => return Err(err),
                    };
                    script_cache.entry(location.script.id.clone()).or_insert(script)
                }
            };

            let Some(line) = token_pos_to_line(&script.token_pos_table, location.token_pos) else {
                continue;
            };
            let line = line as Line;

            let qualified_name = match (&owner, func.name.is_empty()) {
                (Some(owner), false) => format!("{owner}.{}", func.name),
                (None, false) => func.name.clone(),
                (_, true) => format!("{}:{}", func.kind, location.token_pos),
            };

            let hit_map = fragment
                .entry(script.uri.clone())
                .or_insert_with(HitMap::default);
            hit_map
                .func_names
                .get_or_insert_with(BTreeMap::new)
                .insert(line, qualified_name);
        }
    }

    Ok(())
}

/// Binary-searches a `Script.tokenPosTable` (rows `[line, tokenPos, col,
/// tokenPos, col, ...]`, sorted by line) for the line containing
/// `token_pos`. Returns `None` if no row's token positions contain an exact
/// match (spec.md §4.3, "Token-position binary search").
pub(crate) fn token_pos_to_line(table: &[Vec<i64>], token_pos: i64) -> Option<i64> {
    let mut lo = 0usize;
    let mut hi = table.len();
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        let row = &table[mid];
        if row.len() < 2 {
            lo = mid + 1;
            continue;
        }
        if row[1] > token_pos {
            hi = mid;
        } else {
            if row.iter().skip(1).step_by(2).any(|&tp| tp == token_pos) {
                return Some(row[0]);
            }
            lo = mid + 1;
        }
    }
    None
}

/// Fire-and-forget resume of every visited isolate whose pause-event kind
/// wasn't already `Resume`, with errors swallowed individually (spec.md
/// §4.3 step 4 / §5, "`resume` calls at cleanup are issued concurrently").
async fn resume_all(service: &dyn VmService, visited: &[(String, Option<PauseEventKind>)]) {
    let futures = visited
        .iter()
        .filter(|(_, kind)| !matches!(kind, Some(PauseEventKind::Resume)))
        .map(|(id, _)| async move {
            if let Err(err) = service.resume(id).await {
                warn!(isolate = %id, %err, "failed to resume isolate");
            }
        });
    futures_join_all(futures).await;
}

/// Small stand-in for `futures::future::join_all` so this module doesn't
/// need a dependency on the `futures` crate just for one call site; `tokio`
/// is already a hard dependency of this module.
async fn futures_join_all<F: std::future::Future<Output = ()>>(futures: impl IntoIterator<Item = F>) {
    let handles: Vec<_> = futures.into_iter().collect();
    for fut in handles {
        fut.await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_pos_binary_search_finds_exact_match() {
        let table = vec![
            vec![1, 10, 1, 14, 2],
            vec![2, 20, 1, 25, 3],
            vec![3, 30, 1],
        ];
        assert_eq!(token_pos_to_line(&table, 14), Some(1));
        assert_eq!(token_pos_to_line(&table, 25), Some(2));
        assert_eq!(token_pos_to_line(&table, 30), Some(3));
        assert_eq!(token_pos_to_line(&table, 99), None);
    }

    #[test]
    fn cache_json_round_trips() {
        let mut cache = CoverableLineCache::new();
        cache.insert("package:app/a.dart".to_string(), BTreeSet::from([1, 3, 5]));
        cache.insert("package:app/b.dart".to_string(), BTreeSet::new());

        let json = cache_to_json(&cache);
        let decoded = cache_from_json(&json).unwrap();
        assert_eq!(decoded, cache);
    }

    #[test]
    fn cache_from_json_rejects_non_object() {
        let err = cache_from_json(&serde_json::json!([1, 2, 3])).unwrap_err();
        assert!(matches!(err, CollectError::InvalidCoverageEntry(_)));
    }

    #[test]
    fn scope_filter_matches_package_prefix_only() {
        let scope = vec!["foo".to_string()];
        assert!(includes_script("package:foo/bar.dart", &scope));
        assert!(!includes_script("package:baz/bar.dart", &scope));
        assert!(!includes_script("dart:core", &scope));
        assert!(includes_script("dart:core", &[]));
    }

    #[tokio::test]
    async fn s5_isolate_group_dedup() {
        use crate::vmservice::types::{IsolateGroupRef, IsolateRef, SourceReportCoverage, SourceReportRange};
        use test_utils::MockVmServiceBuilder;

        let vm = VmInfo {
            isolates: vec![
                IsolateRef {
                    id: "isolates/1".to_string(),
                    isolate_group_id: Some("group/1".to_string()),
                },
                IsolateRef {
                    id: "isolates/2".to_string(),
                    isolate_group_id: Some("group/1".to_string()),
                },
            ],
            isolate_groups: vec![IsolateGroupRef {
                id: "group/1".to_string(),
            }],
        };

        let report = SourceReport {
            ranges: vec![SourceReportRange {
                script_index: 0,
                compiled: true,
                coverage: Some(SourceReportCoverage {
                    hits: vec![1, 2],
                    misses: vec![],
                }),
                branch_coverage: None,
            }],
            scripts: vec![crate::vmservice::types::ScriptRef {
                id: "scripts/a".to_string(),
                uri: "package:app/a.dart".to_string(),
            }],
        };

        let isolate_1 = Isolate {
            id: "isolates/1".to_string(),
            isolate_group_id: Some("group/1".to_string()),
            pause_event: None,
            libraries: vec![],
        };
        let isolate_2 = Isolate {
            id: "isolates/2".to_string(),
            isolate_group_id: Some("group/1".to_string()),
            pause_event: None,
            libraries: vec![],
        };

        let service = MockVmServiceBuilder::new()
            .version(3, 61)
            .vm(vm)
            .isolate(isolate_1)
            .isolate(isolate_2)
            .source_report("isolates/1", report.clone())
            .source_report("isolates/2", report)
            .build();

        let config = CollectorConfig {
            wait_paused: false,
            ..Default::default()
        };
        let result = collect(&service, &config, None).await.unwrap();

        let hit_map = &result["package:app/a.dart"];
        assert_eq!(hit_map.line_hits, BTreeMap::from([(1, 1), (2, 1)]));
        assert!(service.was_disposed());
    }

    #[tokio::test]
    async fn isolate_group_dedup_without_fast_iso_groups() {
        use crate::vmservice::types::{IsolateGroup, IsolateGroupRef, IsolateRef, SourceReportCoverage, SourceReportRange};
        use test_utils::MockVmServiceBuilder;

        // Below 3.61: no isolate carries `isolateGroupId` directly, so the
        // collector must fetch `getIsolateGroup("group/1")` itself to learn
        // that both isolates share a group.
        let vm = VmInfo {
            isolates: vec![
                IsolateRef {
                    id: "isolates/1".to_string(),
                    isolate_group_id: None,
                },
                IsolateRef {
                    id: "isolates/2".to_string(),
                    isolate_group_id: None,
                },
            ],
            isolate_groups: vec![IsolateGroupRef {
                id: "group/1".to_string(),
            }],
        };

        let report = SourceReport {
            ranges: vec![SourceReportRange {
                script_index: 0,
                compiled: true,
                coverage: Some(SourceReportCoverage {
                    hits: vec![1, 2],
                    misses: vec![],
                }),
                branch_coverage: None,
            }],
            scripts: vec![crate::vmservice::types::ScriptRef {
                id: "scripts/a".to_string(),
                uri: "package:app/a.dart".to_string(),
            }],
        };

        let isolate_1 = Isolate {
            id: "isolates/1".to_string(),
            isolate_group_id: None,
            pause_event: None,
            libraries: vec![],
        };
        let isolate_2 = Isolate {
            id: "isolates/2".to_string(),
            isolate_group_id: None,
            pause_event: None,
            libraries: vec![],
        };

        let service = MockVmServiceBuilder::new()
            .version(3, 60)
            .vm(vm)
            .isolate(isolate_1)
            .isolate(isolate_2)
            .isolate_group(IsolateGroup {
                id: "group/1".to_string(),
                isolates: vec![
                    IsolateRef {
                        id: "isolates/1".to_string(),
                        isolate_group_id: None,
                    },
                    IsolateRef {
                        id: "isolates/2".to_string(),
                        isolate_group_id: None,
                    },
                ],
            })
            .source_report("isolates/1", report.clone())
            .source_report("isolates/2", report)
            .build();

        let config = CollectorConfig {
            wait_paused: false,
            ..Default::default()
        };
        let result = collect(&service, &config, None).await.unwrap();

        let hit_map = &result["package:app/a.dart"];
        assert_eq!(hit_map.line_hits, BTreeMap::from([(1, 1), (2, 1)]));
        assert!(service.was_disposed());
    }
}
