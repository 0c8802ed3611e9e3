use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::models::bar::{PriceBar, RawBar};

/// Price history for one symbol, oldest bar first.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolHistory {
    pub symbol: String,
    pub bars: Vec<PriceBar>,
}

/// Parse a JSON array of raw bars for a single symbol.
///
/// Bars are kept in file order; ordering is checked by the analyzer.
pub fn parse_history(json: &str) -> Result<SymbolHistory> {
    let raw: Vec<RawBar> = serde_json::from_str(json).context("invalid bar JSON")?;
    let Some(symbol) = raw.first().map(|b| b.symbol.clone()) else {
        anyhow::bail!("history contains no bars");
    };

    let bars = raw
        .into_iter()
        .map(PriceBar::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SymbolHistory { symbol, bars })
}

pub fn read_history(path: &Path) -> Result<SymbolHistory> {
    let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let history = parse_history(&json).with_context(|| format!("parsing {}", path.display()))?;
    debug!("Loaded {} bars for {} from {}", history.bars.len(), history.symbol, path.display());
    Ok(history)
}

/// Load every `*.json` file in `dir`, sorted by file name.
///
/// One result per file, so a single bad file does not hide the rest.
pub fn load_dir(dir: &Path) -> Result<Vec<(PathBuf, Result<SymbolHistory>)>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();

    if paths.is_empty() {
        warn!("No *.json histories found in {}", dir.display());
    }

    Ok(paths
        .into_iter()
        .map(|path| {
            let history = read_history(&path);
            (path, history)
        })
        .collect())
}
