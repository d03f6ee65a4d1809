use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use covcollect_core::hitmap;
use covcollect_core::vmservice::collector::{self, CollectorConfig, CoverableLineCache};
#[cfg(feature = "ws-transport")]
use covcollect_core::vmservice::ws::WsVmService;

pub struct CollectArgs {
    pub uri: String,
    pub output: PathBuf,
    pub scope: Vec<String>,
    pub function_coverage: bool,
    pub branch_coverage: bool,
    pub include_sdk_sources: bool,
    pub resume_isolates: bool,
    pub timeout_secs: u64,
    pub cache_file: Option<PathBuf>,
}

/// Loads a [`CoverableLineCache`] from `path`, if set. A missing file is not
/// an error — the first `collect` run against a fresh cache file has nothing
/// to load yet.
fn load_cache(path: Option<&PathBuf>) -> Result<CoverableLineCache> {
    let Some(path) = path else {
        return Ok(CoverableLineCache::new());
    };
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let value: serde_json::Value =
                serde_json::from_str(&text).with_context(|| format!("parsing cache file '{}'", path.display()))?;
            collector::cache_from_json(&value).context("decoding coverable-line cache")
        }
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(CoverableLineCache::new()),
        Err(err) => Err(err).with_context(|| format!("reading cache file '{}'", path.display())),
    }
}

fn save_cache(path: Option<&PathBuf>, cache: &CoverableLineCache) -> Result<()> {
    let Some(path) = path else { return Ok(()) };
    let json = collector::cache_to_json(cache);
    let file = std::fs::File::create(path).with_context(|| format!("creating cache file '{}'", path.display()))?;
    serde_json::to_writer_pretty(file, &json).context("writing coverable-line cache")
}

#[cfg(feature = "ws-transport")]
pub async fn run(args: CollectArgs) -> Result<()> {
    let timeout = Duration::from_secs(args.timeout_secs);
    let service = WsVmService::connect(&args.uri, timeout)
        .await
        .with_context(|| format!("connecting to VM service at '{}'", args.uri))?;

    let config = CollectorConfig {
        isolate_ids: None,
        scoped_output: args.scope,
        function_coverage: args.function_coverage,
        branch_coverage: args.branch_coverage,
        include_sdk_sources: args.include_sdk_sources,
        wait_paused: true,
        resume_isolates: args.resume_isolates,
        timeout,
    };

    let mut cache = load_cache(args.cache_file.as_ref())?;
    let map = collector::collect(&service, &config, Some(&mut cache))
        .await
        .context("collecting coverage")?;
    save_cache(args.cache_file.as_ref(), &cache)?;

    let disk = hitmap::to_disk_format(&map);
    let file = std::fs::File::create(&args.output)
        .with_context(|| format!("creating output file '{}'", args.output.display()))?;
    serde_json::to_writer_pretty(file, &disk).context("writing coverage json")?;

    tracing::info!(sources = map.len(), output = %args.output.display(), "wrote coverage");
    Ok(())
}

#[cfg(not(feature = "ws-transport"))]
pub async fn run(_args: CollectArgs) -> Result<()> {
    anyhow::bail!("this build was compiled without the `ws-transport` feature; no VM service transport is available")
}
