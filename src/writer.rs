use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::mpsc::Receiver,
};

use log::error;

use crate::{PelotonError, feed::Snapshot};

/// Write one snapshot to `dir`, named after its epoch timestamp.
pub fn write_snapshot(dir: &Path, snapshot: &Snapshot) -> Result<PathBuf, PelotonError> {
    let path = dir.join(format!("{}.json", snapshot.timestamp));
    let file = File::create(&path).map_err(|e| PelotonError::WriterError { source: e })?;
    let mut file_writer = BufWriter::new(file);
    serde_json::to_writer(&mut file_writer, snapshot)
        .map_err(|e| PelotonError::WriterSerializeError { source: e })?;
    file_writer
        .flush()
        .map_err(|e| PelotonError::WriterError { source: e })?;
    Ok(path)
}

/// Persist every snapshot received until the sending side hangs up.
///
/// A snapshot that fails to write is logged and skipped.
pub fn write_snapshots(
    dir: &Path,
    snapshot_receiver: Receiver<Snapshot>,
) -> Result<(), PelotonError> {
    fs::create_dir_all(dir).map_err(|e| PelotonError::WriterError { source: e })?;
    for snapshot in &snapshot_receiver {
        if let Err(e) = write_snapshot(dir, &snapshot) {
            error!(
                "Error while writing snapshot {} to {:?}: {}",
                snapshot.timestamp, dir, e
            );
        }
    }
    Ok(())
}
