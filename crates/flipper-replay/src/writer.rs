//! Saving recordings to disk.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::codec::encode_recording;
use crate::error::ReplayError;
use crate::types::Recording;

/// Write `recording` to `path`, replacing any existing file.
pub fn save(recording: &Recording, path: impl AsRef<Path>) -> Result<(), ReplayError> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    encode_recording(&mut writer, recording)?;
    writer.flush()?;
    debug!(
        path = %path.display(),
        frames = recording.frame_count(),
        bytes = recording.raw_data().len(),
        "recording saved"
    );
    Ok(())
}
