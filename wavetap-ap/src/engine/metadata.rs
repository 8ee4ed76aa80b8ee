//! Container metadata reader using symphonia
//!
//! Reads tags, embedded artwork and duration from a local file without
//! decoding any audio. Used by the session-less `getMetadata` command and by
//! the local engine after it binds a source.

use crate::engine::MetadataReader;
use crate::error::{Error, Result};
use std::fs::File;
use std::path::Path;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::{Hint, ProbeResult};
use tracing::debug;
use wavetap_common::TrackMetadata;

/// Metadata reader backed by the symphonia probe
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaMetadataReader;

impl SymphoniaMetadataReader {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataReader for SymphoniaMetadataReader {
    fn read(&self, path: &Path) -> Result<TrackMetadata> {
        read_metadata(path)
    }
}

/// Probe a file and collect its metadata
pub fn read_metadata(path: &Path) -> Result<TrackMetadata> {
    let mut probed = probe_file(path)?;
    let metadata = collect_metadata(&mut probed);

    debug!(
        "Read metadata for {}: title={:?} duration={:?}",
        path.display(),
        metadata.title,
        metadata.duration
    );
    Ok(metadata)
}

/// Open a local file and probe its container format
pub(crate) fn probe_file(path: &Path) -> Result<ProbeResult> {
    let file = File::open(path)
        .map_err(|e| Error::Decode(format!("Failed to open {}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::Decode(format!("Unsupported format {}: {}", path.display(), e)))
}

/// Collect tags, artwork and duration from a probed source
///
/// Tags found before the container (ID3v2 and friends) are read first, then
/// container tags, so container values win when both are present.
pub(crate) fn collect_metadata(probed: &mut ProbeResult) -> TrackMetadata {
    let mut metadata = TrackMetadata::default();

    if let Some(pre_container) = probed.metadata.get() {
        if let Some(revision) = pre_container.current() {
            apply_revision(&mut metadata, revision);
        }
    }

    {
        let container = probed.format.metadata();
        if let Some(revision) = container.current() {
            apply_revision(&mut metadata, revision);
        }
    }

    if let Some(track) = probed.format.default_track() {
        let params = &track.codec_params;
        if let (Some(frames), Some(rate)) = (params.n_frames, params.sample_rate) {
            if rate > 0 {
                metadata.duration = Some(frames as f64 / rate as f64);
            }
        }
    }

    metadata
}

/// Copy the tags and artwork of one revision into `metadata`
fn apply_revision(metadata: &mut TrackMetadata, revision: &MetadataRevision) {
    for tag in revision.tags() {
        let value = Some(tag.value.to_string());
        match tag.std_key {
            Some(StandardTagKey::TrackTitle) => metadata.title = value,
            Some(StandardTagKey::Artist) => metadata.artist = value,
            Some(StandardTagKey::Album) => metadata.album = value,
            Some(StandardTagKey::Genre) => metadata.genre = value,
            Some(StandardTagKey::Date) => metadata.time_released = value,
            Some(StandardTagKey::OriginalDate) if metadata.time_released.is_none() => {
                metadata.time_released = value
            }
            _ => {}
        }
    }

    if let Some(visual) = revision.visuals().first() {
        metadata.artwork = Some(visual.data.to_vec());
    }
}
