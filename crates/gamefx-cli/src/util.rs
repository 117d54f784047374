use std::{fs::File, io, path::Path};

use anyhow::Context;
use gamefx_analysis::trial::TrialCollection;

pub fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", file_kind, path.display()))?;

    let reader = io::BufReader::new(file);
    let value = serde_json::from_reader(reader).with_context(|| {
        format!(
            "Failed to parse {} JSON file: {}",
            file_kind,
            path.display()
        )
    })?;

    Ok(value)
}

/// Read a trial dataset from a JSON file
///
/// # Errors
///
/// Returns error if file cannot be opened or parsed
pub fn read_trials_file<P>(path: P) -> anyhow::Result<TrialCollection>
where
    P: AsRef<Path>,
{
    read_json_file("trials", path)
}

/// Write a serializable value as pretty JSON to a file
///
/// # Errors
///
/// Returns error if the file cannot be created or written
pub fn write_json_file<T, P>(value: &T, path: P) -> anyhow::Result<()>
where
    T: serde::Serialize,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::create(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))?;
    serde_json::to_writer_pretty(io::BufWriter::new(file), value)
        .with_context(|| format!("Failed to write JSON to {}", path.display()))?;
    Ok(())
}
