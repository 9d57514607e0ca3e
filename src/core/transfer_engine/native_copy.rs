use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Buffer size for file I/O operations (128KB for optimal throughput)
const BUFFER_SIZE: usize = 128 * 1024;

/// A failed copy, tagged with the step that failed.
#[derive(Debug, Error)]
#[error("failed to {stage}: {source}")]
pub struct CopyError {
    pub stage: &'static str,
    #[source]
    pub source: io::Error,
}

fn at(stage: &'static str) -> impl FnOnce(io::Error) -> CopyError {
    move |source| CopyError { stage, source }
}

/// Copy a single file byte-for-byte, overwriting `dest`, then carry over
/// permissions and timestamps.
///
/// Preserving the modification time keeps later differential runs from
/// re-selecting a file that was just copied.
pub fn copy_single_file(source: &Path, dest: &Path) -> Result<u64, CopyError> {
    let source_metadata = fs::metadata(source).map_err(at("read source metadata"))?;

    let source_file = File::open(source).map_err(at("open source file"))?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, source_file);

    let dest_file = File::create(dest).map_err(at("create destination file"))?;
    let mut writer = BufWriter::with_capacity(BUFFER_SIZE, dest_file);

    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut bytes_written: u64 = 0;

    loop {
        let bytes_read = reader.read(&mut buffer).map_err(at("read from source"))?;
        if bytes_read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..bytes_read])
            .map_err(at("write to destination"))?;
        bytes_written += bytes_read as u64;
    }

    writer.flush().map_err(at("flush destination file"))?;
    drop(writer);

    // Metadata is best effort; some filesystems refuse it.
    if let Err(e) = fs::set_permissions(dest, source_metadata.permissions()) {
        debug!(dest = %dest.display(), error = %e, "Failed to set file permissions");
    }

    let atime = filetime::FileTime::from_last_access_time(&source_metadata);
    let mtime = filetime::FileTime::from_last_modification_time(&source_metadata);
    if let Err(e) = filetime::set_file_times(dest, atime, mtime) {
        debug!(dest = %dest.display(), error = %e, "Failed to preserve file timestamps");
    }

    Ok(bytes_written)
}
