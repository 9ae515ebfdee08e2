use {
    crate::{data::cache_file::create_file_with_parents, models::OutcomeLedger},
    anyhow::{Context, Result},
    std::fs::File,
    std::io::{BufReader, BufWriter},
    std::path::Path,
};

pub fn save_ledger(ledger: &OutcomeLedger, path: &Path) -> Result<()> {
    let file = create_file_with_parents(path)?;
    let writer = BufWriter::new(file);
    bincode::serialize_into(writer, ledger)
        .with_context(|| format!("Failed to write ledger snapshot: {}", path.display()))?;
    Ok(())
}

/// Missing file means an empty ledger over `window` offsets
pub fn load_ledger(path: &Path, window: usize) -> Result<OutcomeLedger> {
    if !path.exists() {
        return Ok(OutcomeLedger::new(window));
    }
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let ledger = bincode::deserialize_from(reader)
        .with_context(|| format!("Failed to read ledger snapshot: {}", path.display()))?;
    Ok(ledger)
}
