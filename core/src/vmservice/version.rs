//! Feature-flag table, spec.md §4.3: capabilities are derived once from
//! `getVersion()` at session start and passed around as an immutable record
//! rather than re-queried on every RPC (spec.md §9, "Version-gated
//! features").

use crate::vmservice::types::VmVersion;

#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    /// `Profiler.startPreciseCoverage`-equivalent branch counters. Absent
    /// below 3.56; the collector disables the request and emits a warning
    /// rather than failing.
    pub branch_coverage: bool,
    /// `getSourceReport`'s `libraryFilters` param. Absent below 3.57; the
    /// collector falls back to per-script scoping.
    pub library_filters: bool,
    /// `IsolateRef.isolateGroupId`. Absent below 3.61; the collector falls
    /// back to building the isolate->group map from `VM.isolateGroups`.
    pub fast_iso_groups: bool,
    /// `getSourceReport`'s `librariesAlreadyCompiled` param. Absent below
    /// 4.13; the collector omits it entirely rather than sending an
    /// unsupported field.
    pub line_cache: bool,
}

impl Capabilities {
    pub fn from_version(version: VmVersion) -> Self {
        Self {
            branch_coverage: version.at_least(3, 56),
            library_filters: version.at_least(3, 57),
            fast_iso_groups: version.at_least(3, 61),
            line_cache: version.at_least(4, 13),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_gate_on_exact_minimums() {
        let below = Capabilities::from_version(VmVersion { major: 3, minor: 55 });
        assert!(!below.branch_coverage);

        let at = Capabilities::from_version(VmVersion { major: 3, minor: 56 });
        assert!(at.branch_coverage);
        assert!(!at.library_filters);

        let all = Capabilities::from_version(VmVersion { major: 4, minor: 13 });
        assert!(all.branch_coverage && all.library_filters && all.fast_iso_groups && all.line_cache);
    }
}
