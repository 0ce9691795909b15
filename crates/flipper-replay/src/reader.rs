//! Loading recordings from disk.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use tracing::debug;

use crate::codec::decode_recording;
use crate::error::ReplayError;
use crate::types::Recording;

/// Load and fully validate the recording stored at `path`.
///
/// The file is read through a buffered reader; see
/// [`decode_recording`] for the validation performed.
pub fn load(path: impl AsRef<Path>) -> Result<Recording, ReplayError> {
    let path = path.as_ref();
    let mut reader = BufReader::new(File::open(path)?);
    let recording = decode_recording(&mut reader)?;
    debug!(
        path = %path.display(),
        frames = recording.frame_count(),
        elements = recording.element_count(),
        "recording loaded"
    );
    Ok(recording)
}
