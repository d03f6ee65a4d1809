use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use covcollect_core::hitmap::{self, CoverageMap, DiskCoverageFile};

/// Merges a set of already-collected on-disk coverage files (spec.md §6's
/// `CodeCoverage` envelope) into one. Sources are assumed already resolved
/// to stable URIs by whatever produced each input, so merging is identity
/// resolution with no ignore-directive re-filtering.
pub fn run(inputs: &[PathBuf], output: &Path) -> Result<()> {
    let mut merged = CoverageMap::new();
    for input in inputs {
        let file = std::fs::read_to_string(input)
            .with_context(|| format!("reading '{}'", input.display()))?;
        let disk: DiskCoverageFile =
            serde_json::from_str(&file).with_context(|| format!("parsing '{}'", input.display()))?;
        let map = hitmap::from_disk_format(&disk, |uri| Some(uri.to_string()), &HashMap::new())
            .with_context(|| format!("decoding coverage entries in '{}'", input.display()))?;
        hitmap::merge(&mut merged, map).context("merging coverage maps")?;
    }

    let disk = hitmap::to_disk_format(&merged);
    let out_file = std::fs::File::create(output).with_context(|| format!("creating '{}'", output.display()))?;
    serde_json::to_writer_pretty(out_file, &disk).context("writing merged coverage json")?;

    tracing::info!(inputs = inputs.len(), sources = merged.len(), output = %output.display(), "merged coverage");
    Ok(())
}
