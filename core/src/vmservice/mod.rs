//! The VM-Service collector (C3 in spec.md §4.3): connects to a running
//! program's debugger/introspection service, synchronizes on every isolate
//! being paused, deduplicates isolates sharing an isolate group, and folds
//! per-isolate source reports into a canonical [`crate::hitmap::CoverageMap`].
//!
//! The wire transport is an injected capability (spec.md §1, "Out of
//! scope"): this module only depends on the [`VmService`] trait. A
//! tokio-tungstenite-backed implementation lives in [`ws`] behind the
//! `ws-transport` feature, so a complete binary can be built without
//! supplying its own transport, but nothing in `collector`/`connect`/
//! `version` depends on it directly.

pub mod collector;
pub mod connect;
pub mod types;
pub mod version;

#[cfg(feature = "ws-transport")]
pub mod ws;

use async_trait::async_trait;

use crate::error::Result;
use types::{
    Class, Func, Isolate, IsolateGroup, Library, Script, ScriptRef, SourceReport, SourceReportKind,
    SourceReportParams, VmInfo, VmVersion,
};

/// The RPC surface the collector drives (spec.md §4.3). Each method
/// corresponds to one VM Service RPC of the same (de-camel-cased) name.
/// Implementations should map a VM Service `Sentinel` response (a stale
/// isolate/object reference) to [`crate::error::CollectError::StaleIsolate`]
/// so the collector can apply the "skip and continue" policy spec.md §7
/// specifies for it.
#[async_trait]
pub trait VmService: Send + Sync {
    async fn get_version(&self) -> Result<VmVersion>;
    async fn get_vm(&self) -> Result<VmInfo>;
    async fn get_isolate(&self, isolate_id: &str) -> Result<Isolate>;
    /// Fetches one isolate group's full membership list. Only called when
    /// `fastIsoGroups` is unsupported by the target VM Service (spec.md
    /// §4.3 step 2) — a VM new enough to report `isolateGroupId` directly on
    /// every `IsolateRef` never needs this round trip.
    async fn get_isolate_group(&self, group_id: &str) -> Result<IsolateGroup>;
    async fn get_scripts(&self, isolate_id: &str) -> Result<Vec<ScriptRef>>;
    async fn get_script(&self, isolate_id: &str, script_id: &str) -> Result<Script>;
    async fn get_library(&self, isolate_id: &str, library_id: &str) -> Result<Library>;
    async fn get_class(&self, isolate_id: &str, class_id: &str) -> Result<Class>;
    async fn get_function(&self, isolate_id: &str, function_id: &str) -> Result<Func>;
    async fn get_source_report(
        &self,
        isolate_id: &str,
        kinds: &[SourceReportKind],
        params: SourceReportParams,
    ) -> Result<SourceReport>;
    async fn resume(&self, isolate_id: &str) -> Result<()>;
    /// Releases the service handle and its underlying socket. Always called
    /// by [`collector::collect`] on every exit path, success or failure
    /// (spec.md §5, "Resource discipline").
    async fn dispose(&self) -> Result<()>;
}
