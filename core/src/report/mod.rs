//! Report formatters (C4 in spec.md §4.4): serialize a canonical
//! [`crate::hitmap::CoverageMap`] to LCOV text or a pretty-printed annotated
//! source listing. Both formatters share the same resolve-then-filter
//! front end, implemented once here.

pub mod lcov;
pub mod pretty;

use std::path::{Path, PathBuf};

use crate::hitmap::{CoverageMap, HitMap};
use crate::resolve::Resolver;

/// Shared filtering/relativization knobs for both formatters.
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    /// If non-empty, only sources whose resolved path starts with one of
    /// these prefixes are emitted.
    pub report_on: Vec<PathBuf>,
    /// When set, emitted paths are relativized against it.
    pub base_path: Option<PathBuf>,
    pub report_funcs: bool,
}

/// One hit map paired with the filesystem path it resolved to, in the order
/// it should be emitted (sorted by resolved path for determinism).
pub(crate) struct ResolvedEntry<'a> {
    pub path: PathBuf,
    pub hit_map: &'a HitMap,
}

pub(crate) fn resolve_and_filter<'a>(
    map: &'a CoverageMap,
    resolver: &dyn Resolver,
    options: &ReportOptions,
) -> Vec<ResolvedEntry<'a>> {
    let mut entries: Vec<ResolvedEntry<'a>> = map
        .iter()
        .filter_map(|(uri, hit_map)| {
            let resolved = resolver.resolve(uri)?;
            let path = resolved.strip_prefix("file://").unwrap_or(&resolved);
            let path = PathBuf::from(path);
            if !options.report_on.is_empty() && !options.report_on.iter().any(|prefix| path.starts_with(prefix)) {
                return None;
            }
            Some(ResolvedEntry { path, hit_map })
        })
        .collect();
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

pub(crate) fn display_path<'a>(path: &'a Path, base_path: Option<&Path>) -> std::borrow::Cow<'a, Path> {
    match base_path {
        Some(base) => match path.strip_prefix(base) {
            Ok(relative) => std::borrow::Cow::Owned(relative.to_path_buf()),
            Err(_) => std::borrow::Cow::Borrowed(path),
        },
        None => std::borrow::Cow::Borrowed(path),
    }
}
