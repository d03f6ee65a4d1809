//! An in-memory, hand-built [`VmService`] double for collector tests. Real
//! Dart/VM Service-backed mocking tends to need a live process, so rather
//! than reach for `mockall`'s trait-mocking on this particular trait (it's
//! used for the simpler, stateless traits in `core`'s own test modules
//! instead), this builds a small stateful fake that serves canned
//! responses and records what was called.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use covcollect_core::error::{CollectError, Result};
use covcollect_core::vmservice::types::{
    Class, Func, Isolate, IsolateGroup, Library, Script, ScriptRef, SourceReport, SourceReportKind,
    SourceReportParams, VmInfo, VmVersion,
};
use covcollect_core::vmservice::VmService;

#[derive(Default)]
struct SourceReportKey {
    isolate_id: String,
    script_id: Option<String>,
}

/// Builds a [`MockVmService`] fluently: register isolates, scripts,
/// function-coverage objects, and the source report each should return,
/// then call [`build`](Self::build).
#[derive(Default)]
pub struct MockVmServiceBuilder {
    version: VmVersion,
    vm: VmInfo,
    isolates: HashMap<String, Isolate>,
    isolate_groups: HashMap<String, IsolateGroup>,
    scripts_by_isolate: HashMap<String, Vec<ScriptRef>>,
    scripts: HashMap<String, Script>,
    libraries: HashMap<String, Library>,
    classes: HashMap<String, Class>,
    functions: HashMap<String, Func>,
    reports: Vec<(SourceReportKey, SourceReport)>,
}

impl MockVmServiceBuilder {
    pub fn new() -> Self {
        Self {
            version: VmVersion { major: 4, minor: 13 },
            ..Default::default()
        }
    }

    pub fn version(mut self, major: u32, minor: u32) -> Self {
        self.version = VmVersion { major, minor };
        self
    }

    pub fn vm(mut self, vm: VmInfo) -> Self {
        self.vm = vm;
        self
    }

    pub fn isolate(mut self, isolate: Isolate) -> Self {
        self.isolates.insert(isolate.id.clone(), isolate);
        self
    }

    /// Registers a full `IsolateGroup` (id + member isolates), served by
    /// `getIsolateGroup`. Only consulted by the collector when
    /// `fastIsoGroups` is unsupported by the mock's configured version.
    pub fn isolate_group(mut self, group: IsolateGroup) -> Self {
        self.isolate_groups.insert(group.id.clone(), group);
        self
    }

    pub fn scripts(mut self, isolate_id: impl Into<String>, scripts: Vec<ScriptRef>) -> Self {
        self.scripts_by_isolate.insert(isolate_id.into(), scripts);
        self
    }

    pub fn script(mut self, script: Script) -> Self {
        self.scripts.insert(script.id.clone(), script);
        self
    }

    pub fn library(mut self, library: Library) -> Self {
        self.libraries.insert(library.id.clone(), library);
        self
    }

    pub fn class(mut self, class: Class) -> Self {
        self.classes.insert(class.id.clone(), class);
        self
    }

    pub fn function(mut self, func: Func) -> Self {
        self.functions.insert(func.id.clone(), func);
        self
    }

    /// Registers the source report returned for a whole-isolate
    /// `getSourceReport` call (no `scriptId`).
    pub fn source_report(mut self, isolate_id: impl Into<String>, report: SourceReport) -> Self {
        self.reports.push((
            SourceReportKey {
                isolate_id: isolate_id.into(),
                script_id: None,
            },
            report,
        ));
        self
    }

    /// Registers the source report returned for a per-script
    /// `getSourceReport` call scoped to `script_id`.
    pub fn source_report_for_script(
        mut self,
        isolate_id: impl Into<String>,
        script_id: impl Into<String>,
        report: SourceReport,
    ) -> Self {
        self.reports.push((
            SourceReportKey {
                isolate_id: isolate_id.into(),
                script_id: Some(script_id.into()),
            },
            report,
        ));
        self
    }

    pub fn build(self) -> MockVmService {
        MockVmService {
            version: self.version,
            vm: self.vm,
            isolates: self.isolates,
            isolate_groups: self.isolate_groups,
            scripts_by_isolate: self.scripts_by_isolate,
            scripts: self.scripts,
            libraries: self.libraries,
            classes: self.classes,
            functions: self.functions,
            reports: self.reports,
            resumed: Mutex::new(Vec::new()),
            disposed: Mutex::new(false),
        }
    }
}

pub struct MockVmService {
    version: VmVersion,
    vm: VmInfo,
    isolates: HashMap<String, Isolate>,
    isolate_groups: HashMap<String, IsolateGroup>,
    scripts_by_isolate: HashMap<String, Vec<ScriptRef>>,
    scripts: HashMap<String, Script>,
    libraries: HashMap<String, Library>,
    classes: HashMap<String, Class>,
    functions: HashMap<String, Func>,
    reports: Vec<(SourceReportKey, SourceReport)>,
    resumed: Mutex<Vec<String>>,
    disposed: Mutex<bool>,
}

impl MockVmService {
    pub fn resumed_isolates(&self) -> Vec<String> {
        self.resumed.lock().unwrap().clone()
    }

    pub fn was_disposed(&self) -> bool {
        *self.disposed.lock().unwrap()
    }
}

#[async_trait]
impl VmService for MockVmService {
    async fn get_version(&self) -> Result<VmVersion> {
        Ok(self.version)
    }

    async fn get_vm(&self) -> Result<VmInfo> {
        Ok(self.vm.clone())
    }

    async fn get_isolate(&self, isolate_id: &str) -> Result<Isolate> {
        self.isolates
            .get(isolate_id)
            .cloned()
            .ok_or_else(|| CollectError::StaleIsolate(isolate_id.to_string()))
    }

    async fn get_isolate_group(&self, group_id: &str) -> Result<IsolateGroup> {
        self.isolate_groups
            .get(group_id)
            .cloned()
            .ok_or_else(|| CollectError::Rpc(format!("no such isolate group '{group_id}' registered with mock")))
    }

    async fn get_scripts(&self, isolate_id: &str) -> Result<Vec<ScriptRef>> {
        Ok(self.scripts_by_isolate.get(isolate_id).cloned().unwrap_or_default())
    }

    async fn get_script(&self, _isolate_id: &str, script_id: &str) -> Result<Script> {
        self.scripts
            .get(script_id)
            .cloned()
            .ok_or_else(|| CollectError::Rpc(format!("no such script '{script_id}' registered with mock")))
    }

    async fn get_library(&self, _isolate_id: &str, library_id: &str) -> Result<Library> {
        self.libraries
            .get(library_id)
            .cloned()
            .ok_or_else(|| CollectError::Rpc(format!("no such library '{library_id}' registered with mock")))
    }

    async fn get_class(&self, _isolate_id: &str, class_id: &str) -> Result<Class> {
        self.classes
            .get(class_id)
            .cloned()
            .ok_or_else(|| CollectError::Rpc(format!("no such class '{class_id}' registered with mock")))
    }

    async fn get_function(&self, _isolate_id: &str, function_id: &str) -> Result<Func> {
        self.functions
            .get(function_id)
            .cloned()
            .ok_or_else(|| CollectError::Rpc(format!("no such function '{function_id}' registered with mock")))
    }

    async fn get_source_report(
        &self,
        isolate_id: &str,
        _kinds: &[SourceReportKind],
        params: SourceReportParams,
    ) -> Result<SourceReport> {
        self.reports
            .iter()
            .find(|(key, _)| key.isolate_id == isolate_id && key.script_id == params.script_id)
            .map(|(_, report)| report.clone())
            .ok_or_else(|| {
                CollectError::Rpc(format!(
                    "no source report registered for isolate '{isolate_id}' script {:?}",
                    params.script_id
                ))
            })
    }

    async fn resume(&self, isolate_id: &str) -> Result<()> {
        self.resumed.lock().unwrap().push(isolate_id.to_string());
        Ok(())
    }

    async fn dispose(&self) -> Result<()> {
        *self.disposed.lock().unwrap() = true;
        Ok(())
    }
}
