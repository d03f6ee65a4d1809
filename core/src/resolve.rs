//! Source-URI resolution and source-text loading (spec.md §4.1/§6): turns
//! the loosely-typed `source` strings a coverage producer hands back into
//! absolute URIs the rest of the crate can key a [`crate::hitmap::CoverageMap`]
//! by, and loads the text behind a resolved URI when a report formatter
//! needs to count total coverable lines or render a source excerpt.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{CollectError, Result};

#[cfg(test)]
use mockall::automock;

/// Maps a producer-reported source identifier to the absolute URI used as a
/// [`crate::hitmap::CoverageMap`] key. Implementations are expected to be
/// cheap and infallible in the common case; an unresolvable source should
/// return `None` rather than erroring, since spec.md §4.1 treats "no
/// resolvable source" as "drop the entry", not "fail the run".
#[cfg_attr(test, automock)]
pub trait Resolver: Send + Sync {
    fn resolve(&self, raw_source: &str) -> Option<String>;
}

/// Loads the text behind an already-resolved source URI, for callers that
/// need line counts or excerpts (the pretty-printer, the ignore-directive
/// scanner).
#[cfg_attr(test, automock)]
pub trait Loader: Send + Sync {
    fn load(&self, uri: &str) -> Result<String>;
}

/// A [`Resolver`] that maps `package:name/path` URIs to on-disk paths using a
/// `.dart_tool/package_config.json`-style package map, and passes through
/// `file://` URIs whose path exists under `project_root` unchanged. Any
/// other scheme (`dart:`, `google3:`, `evaluate:`, ...) resolves to `None`,
/// matching spec.md's "no resolvable source" drop rule for SDK/synthetic
/// sources that were already meant to be filtered upstream by
/// `includesScript`/`includeSdkSources` but slip through a hand-authored
/// report.
pub struct FsResolver {
    project_root: PathBuf,
    package_map: HashMap<String, PathBuf>,
}

impl FsResolver {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            package_map: HashMap::new(),
        }
    }

    /// Registers a `package:name` -> on-disk `lib/` root mapping, the way a
    /// `.dart_tool/package_config.json` entry would.
    pub fn with_package(mut self, name: impl Into<String>, lib_root: impl Into<PathBuf>) -> Self {
        self.package_map.insert(name.into(), lib_root.into());
        self
    }
}

impl Resolver for FsResolver {
    fn resolve(&self, raw_source: &str) -> Option<String> {
        if let Some(rest) = raw_source.strip_prefix("package:") {
            let (name, path) = rest.split_once('/')?;
            let lib_root = self.package_map.get(name)?;
            let resolved = lib_root.join(path);
            return Some(format!("file://{}", resolved.display()));
        }
        if let Some(path) = raw_source.strip_prefix("file://") {
            let candidate = Path::new(path);
            let absolute = if candidate.is_absolute() {
                candidate.to_path_buf()
            } else {
                self.project_root.join(candidate)
            };
            if absolute.exists() {
                return Some(format!("file://{}", absolute.display()));
            }
            return None;
        }
        None
    }
}

/// A [`Loader`] that reads `file://`-scheme URIs straight off disk.
pub struct FsLoader;

impl Loader for FsLoader {
    fn load(&self, uri: &str) -> Result<String> {
        let path = uri
            .strip_prefix("file://")
            .ok_or_else(|| CollectError::InvalidCoverageEntry(format!("not a file:// uri: '{uri}'")))?;
        fs::read_to_string(path).map_err(CollectError::Io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn resolves_package_uri_against_registered_lib_root() {
        let tmp = tempfile::tempdir().unwrap();
        let lib_root = tmp.path().join("lib");
        fs::create_dir_all(&lib_root).unwrap();
        fs::write(lib_root.join("foo.dart"), "void main() {}").unwrap();

        let resolver = FsResolver::new(tmp.path()).with_package("my_app", &lib_root);
        let resolved = resolver.resolve("package:my_app/foo.dart").unwrap();
        assert!(resolved.ends_with("foo.dart"));
        assert!(resolved.starts_with("file://"));
    }

    #[test]
    fn unregistered_package_resolves_to_none() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = FsResolver::new(tmp.path());
        assert!(resolver.resolve("package:unknown/foo.dart").is_none());
    }

    #[test]
    fn sdk_and_synthetic_sources_resolve_to_none() {
        let tmp = tempfile::tempdir().unwrap();
        let resolver = FsResolver::new(tmp.path());
        assert!(resolver.resolve("dart:core").is_none());
        assert!(resolver.resolve("evaluate:source").is_none());
    }

    #[test]
    fn fs_loader_reads_existing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file_path = tmp.path().join("a.dart");
        let mut f = fs::File::create(&file_path).unwrap();
        writeln!(f, "void main() {{}}").unwrap();

        let uri = format!("file://{}", file_path.display());
        let loader = FsLoader;
        let text = loader.load(&uri).unwrap();
        assert!(text.contains("void main"));
    }

    #[test]
    fn fs_loader_rejects_non_file_scheme() {
        let loader = FsLoader;
        assert!(matches!(
            loader.load("package:foo/bar.dart"),
            Err(CollectError::InvalidCoverageEntry(_))
        ));
    }

    #[test]
    fn mocked_resolver_and_loader_drive_a_report_pipeline_stage() {
        use mockall::predicate::eq;

        let mut resolver = MockResolver::new();
        resolver
            .expect_resolve()
            .with(eq("package:app/main.dart"))
            .times(1)
            .returning(|_| Some("file:///abs/main.dart".to_string()));

        let mut loader = MockLoader::new();
        loader
            .expect_load()
            .with(eq("file:///abs/main.dart"))
            .times(1)
            .returning(|_| Ok("void main() {}\n".to_string()));

        let resolved = resolver.resolve("package:app/main.dart").unwrap();
        let text = loader.load(&resolved).unwrap();
        assert_eq!(resolved, "file:///abs/main.dart");
        assert!(text.contains("void main"));
    }
}
