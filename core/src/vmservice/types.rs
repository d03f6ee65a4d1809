//! Typed shapes for the subset of the VM Service RPC surface this crate
//! consumes (spec.md §4.3). The real protocol hands back loosely-typed JSON
//! objects tagged by a `"type"` field; rather than carry that dynamism all
//! the way through the collector, each response is given a concrete record
//! here and a transport (see [`crate::vmservice::ws`]) is responsible for
//! deserializing into it. Fields this crate doesn't look at are simply not
//! modeled — `serde` ignores unknown object keys by default, so responses
//! can grow new fields across VM Service versions without touching this
//! file.

use serde::Deserialize;

/// `(major, minor)` VM Service protocol version, as returned by
/// `getVersion`. Compared against the minimums in
/// [`crate::vmservice::version::Capabilities`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct VmVersion {
    pub major: u32,
    pub minor: u32,
}

impl VmVersion {
    pub fn at_least(&self, major: u32, minor: u32) -> bool {
        (self.major, self.minor) >= (major, minor)
    }
}

/// A reference to an isolate, as it appears in a `VM`'s `isolates` list.
#[derive(Debug, Clone, Deserialize)]
pub struct IsolateRef {
    pub id: String,
    #[serde(rename = "isolateGroupId", default)]
    pub isolate_group_id: Option<String>,
}

/// An isolate group reference, as it appears in a `VM`'s `isolateGroups`
/// list. Member isolates aren't inlined here — fetching them is a separate
/// `getIsolateGroup` round trip (see [`IsolateGroup`]), mirroring the real
/// VM Service protocol.
#[derive(Debug, Clone, Deserialize)]
pub struct IsolateGroupRef {
    pub id: String,
}

/// A fully-loaded isolate group, as returned by `getIsolateGroup(id)`, with
/// its member isolates inlined. Used to build the isolate->group map when
/// `fastIsoGroups` isn't supported by the target VM Service (spec.md §4.3
/// step 2).
#[derive(Debug, Clone, Deserialize)]
pub struct IsolateGroup {
    pub id: String,
    #[serde(default)]
    pub isolates: Vec<IsolateRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VmInfo {
    #[serde(default)]
    pub isolates: Vec<IsolateRef>,
    #[serde(rename = "isolateGroups", default)]
    pub isolate_groups: Vec<IsolateGroupRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum PauseEventKind {
    PauseStart,
    PauseExit,
    PauseBreakpoint,
    PauseInterrupted,
    PauseException,
    Resume,
    #[serde(other)]
    Other,
}

impl PauseEventKind {
    /// Whether this event kind counts as "paused" for the purposes of
    /// `waitForAllPaused` (spec.md §4.3, step 1).
    pub fn is_paused(&self) -> bool {
        matches!(
            self,
            Self::PauseStart
                | Self::PauseException
                | Self::PauseExit
                | Self::PauseInterrupted
                | Self::PauseBreakpoint
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PauseEvent {
    pub kind: PauseEventKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Isolate {
    pub id: String,
    #[serde(rename = "isolateGroupId", default)]
    pub isolate_group_id: Option<String>,
    #[serde(rename = "pauseEvent", default)]
    pub pause_event: Option<PauseEvent>,
    #[serde(default)]
    pub libraries: Vec<LibraryRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptRef {
    pub id: String,
    pub uri: String,
}

/// A fully-loaded `Script` object. `token_pos_table` rows are
/// `[line, tokenPos, column, tokenPos, column, ...]`; see
/// [`crate::vmservice::collector::token_pos_to_line`].
#[derive(Debug, Clone, Deserialize)]
pub struct Script {
    pub id: String,
    pub uri: String,
    #[serde(rename = "tokenPosTable", default)]
    pub token_pos_table: Vec<Vec<i64>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LibraryRef {
    pub id: String,
    pub uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Library {
    pub id: String,
    pub uri: String,
    #[serde(default)]
    pub classes: Vec<ClassRef>,
    #[serde(default)]
    pub functions: Vec<FuncRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ClassRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Class {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub functions: Vec<FuncRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FuncRef {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceLocation {
    pub script: ScriptRef,
    #[serde(rename = "tokenPos")]
    pub token_pos: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Func {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// e.g. "RegularFunction", "GetterFunction", "ImplicitGetterFunction"...
    /// used only for the `"${funcType}:${tokenPos}"` unnamed-function
    /// fallback.
    #[serde(rename = "_kind", default)]
    pub kind: String,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default)]
    pub is_abstract: bool,
    #[serde(default)]
    pub is_implicit: bool,
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceReportKind {
    Coverage,
    BranchCoverage,
}

impl SourceReportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coverage => "Coverage",
            Self::BranchCoverage => "BranchCoverage",
        }
    }
}

/// Parameters for `getSourceReport`, spec.md §4.3. `library_filters` and
/// `libraries_already_compiled` are only populated when the corresponding
/// capability is supported (callers are expected to gate on
/// [`crate::vmservice::version::Capabilities`] before setting them, but a
/// transport should also feel free to drop fields the target VM doesn't
/// understand).
#[derive(Debug, Clone, Default)]
pub struct SourceReportParams {
    pub force_compile: bool,
    pub report_lines: bool,
    pub script_id: Option<String>,
    pub library_filters: Option<Vec<String>>,
    pub libraries_already_compiled: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SourceReportCoverage {
    #[serde(default)]
    pub hits: Vec<u32>,
    #[serde(default)]
    pub misses: Vec<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceReportRange {
    #[serde(rename = "scriptIndex")]
    pub script_index: usize,
    #[serde(default)]
    pub compiled: bool,
    pub coverage: Option<SourceReportCoverage>,
    #[serde(rename = "branchCoverage", default)]
    pub branch_coverage: Option<SourceReportCoverage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceReport {
    #[serde(default)]
    pub ranges: Vec<SourceReportRange>,
    #[serde(default)]
    pub scripts: Vec<ScriptRef>,
}

impl SourceReport {
    pub fn script_uri(&self, index: usize) -> Option<&str> {
        self.scripts.get(index).map(|s| s.uri.as_str())
    }
}
