//! Per-track frame index: construction, lookup, and on-disk persistence.
//!
//! The index is the ground truth the seek-and-verify machinery matches decoded
//! frames against. It is built by a single linear decode of the whole track,
//! recording for every frame its container timestamp, running sample offset,
//! sample count, and a content hash of the decoded PCM.
//!
//! Shape invariants, relied on throughout the crate:
//! - `frames[0].start == 0`
//! - `frames[i + 1].start == frames[i].start + frames[i].length`
//! - every `length > 0`
//!
//! The on-disk payload stores everything needed to decide whether a cached
//! index belongs to the current open request: track number, variable-format
//! flag, DRC scale, and the backend option map. Any mismatch discards the file
//! and triggers a re-index.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::backend::BackendFactory;
use crate::error::{Error, Result};

const INDEX_MAGIC: &[u8; 4] = b"SCIX";
const INDEX_VERSION: u32 = 1;
/// Distinguishes audio indexes from any future video index format.
const STREAM_KIND_AUDIO: u8 = 0;

/// Upper bound applied to length prefixes before allocating, so a corrupt
/// file can't request an absurd reservation.
const MAX_PREFIX_ALLOC: usize = 1 << 20;

/// Everything recorded about one decoded frame at index time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    /// Container timestamp, or [`crate::frame::NO_PTS`].
    pub pts: i64,
    /// Sample offset of this frame's first sample within the track.
    pub start: i64,
    /// Samples per channel in this frame.
    pub length: i64,
    /// MD5 of the frame's raw decoded PCM bytes.
    pub hash: [u8; 16],
}

/// Ordered per-frame metadata for one audio track. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct TrackIndex {
    pub frames: Vec<FrameInfo>,
}

impl TrackIndex {
    pub fn num_frames(&self) -> i64 {
        self.frames.len() as i64
    }

    /// Exact sample count, the sum of all frame lengths.
    pub fn num_samples(&self) -> i64 {
        self.frames
            .last()
            .map(|f| f.start + f.length)
            .unwrap_or(0)
    }

    /// Find the frame whose sample range contains `pos`.
    pub fn frame_containing_sample(&self, pos: i64) -> Option<usize> {
        if pos < 0 || pos >= self.num_samples() {
            return None;
        }
        let i = self.frames.partition_point(|f| f.start + f.length <= pos);
        (i < self.frames.len()).then_some(i)
    }
}

/// The open-request identity an index file is validated against.
#[derive(Debug, Clone, Copy)]
pub struct IndexParams<'a> {
    pub track: i32,
    pub variable_format: bool,
    pub drc_scale: f64,
    pub backend_options: &'a BTreeMap<String, String>,
}

/// Where the index for `base` + `track` lives on disk.
///
/// The track number is part of the name so multiple tracks of one container
/// never collide.
pub fn index_file_path(base: &Path, track: i32) -> PathBuf {
    let mut name = base
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(format!(".{track}.scidx"));
    base.with_file_name(name)
}

/// Build the index with one linear decode pass over the whole track.
///
/// `progress` is invoked after every decoded frame with
/// `(track, bytes_read, bytes_total)` and once more with
/// `(track, i64::MAX, i64::MAX)` when indexing completes. The cancellation
/// token is checked between frames.
pub fn build_track_index(
    factory: &dyn BackendFactory,
    track: i32,
    mut progress: Option<&mut dyn FnMut(i32, i64, i64)>,
    cancel: Option<&AtomicBool>,
) -> Result<TrackIndex> {
    let mut backend = factory.open()?;
    let total = if progress.is_some() {
        backend.source_size()
    } else {
        -1
    };

    let mut frames = Vec::new();
    let mut num_samples = 0i64;

    loop {
        if let Some(token) = cancel {
            if token.load(Ordering::Relaxed) {
                return Err(Error::Cancelled);
            }
        }

        let Some(frame) = backend.next_frame()? else {
            break;
        };

        frames.push(FrameInfo {
            pts: frame.pts,
            start: num_samples,
            length: frame.num_samples,
            hash: frame.content_hash(),
        });
        num_samples += frame.num_samples;

        if let Some(cb) = progress.as_mut() {
            cb(track, backend.source_position(), total);
        }
    }

    if let Some(cb) = progress.as_mut() {
        cb(track, i64::MAX, i64::MAX);
    }

    if frames.is_empty() {
        return Err(Error::index_build(format!(
            "indexing produced no frames for track {track}"
        )));
    }

    Ok(TrackIndex { frames })
}

/// Load a stored index, or `None` when the file is absent, unreadable, or
/// belongs to a different open request.
///
/// Every rejection path collapses to `None`; the caller re-indexes and
/// rewrites the file.
pub fn read_index(path: &Path, params: IndexParams<'_>) -> Option<TrackIndex> {
    let file = File::open(path).ok()?;
    let mut r = BufReader::new(file);

    let mut magic = [0u8; 4];
    r.read_exact(&mut magic).ok()?;
    if &magic != INDEX_MAGIC {
        return None;
    }
    if r.read_u32::<LittleEndian>().ok()? != INDEX_VERSION {
        return None;
    }
    if r.read_u8().ok()? != STREAM_KIND_AUDIO {
        return None;
    }

    if r.read_i32::<LittleEndian>().ok()? != params.track {
        return None;
    }
    if r.read_i32::<LittleEndian>().ok()? != params.variable_format as i32 {
        return None;
    }
    if r.read_f64::<LittleEndian>().ok()?.to_bits() != params.drc_scale.to_bits() {
        return None;
    }

    let option_count = r.read_i32::<LittleEndian>().ok()?;
    if option_count < 0 {
        return None;
    }
    let mut options = BTreeMap::new();
    for _ in 0..option_count {
        let key = read_string(&mut r)?;
        let value = read_string(&mut r)?;
        options.insert(key, value);
    }
    if &options != params.backend_options {
        return None;
    }

    let frame_count = r.read_i64::<LittleEndian>().ok()?;
    if frame_count <= 0 {
        return None;
    }

    let mut frames = Vec::with_capacity((frame_count as usize).min(MAX_PREFIX_ALLOC));
    let mut start = 0i64;
    for _ in 0..frame_count {
        let mut hash = [0u8; 16];
        r.read_exact(&mut hash).ok()?;
        let pts = r.read_i64::<LittleEndian>().ok()?;
        let length = r.read_i64::<LittleEndian>().ok()?;
        if length <= 0 {
            return None;
        }
        frames.push(FrameInfo {
            pts,
            start,
            length,
            hash,
        });
        start += length;
    }

    Some(TrackIndex { frames })
}

/// Persist the index next to the source so later opens skip the linear pass.
pub fn write_index(path: &Path, params: IndexParams<'_>, index: &TrackIndex) -> std::io::Result<()> {
    let mut w = BufWriter::new(File::create(path)?);

    w.write_all(INDEX_MAGIC)?;
    w.write_u32::<LittleEndian>(INDEX_VERSION)?;
    w.write_u8(STREAM_KIND_AUDIO)?;

    w.write_i32::<LittleEndian>(params.track)?;
    w.write_i32::<LittleEndian>(params.variable_format as i32)?;
    w.write_f64::<LittleEndian>(params.drc_scale)?;

    w.write_i32::<LittleEndian>(params.backend_options.len() as i32)?;
    for (key, value) in params.backend_options {
        write_string(&mut w, key)?;
        write_string(&mut w, value)?;
    }

    w.write_i64::<LittleEndian>(index.frames.len() as i64)?;
    for frame in &index.frames {
        w.write_all(&frame.hash)?;
        w.write_i64::<LittleEndian>(frame.pts)?;
        w.write_i64::<LittleEndian>(frame.length)?;
    }

    w.flush()
}

fn read_string(r: &mut impl Read) -> Option<String> {
    let len = r.read_u32::<LittleEndian>().ok()? as usize;
    if len > MAX_PREFIX_ALLOC {
        return None;
    }
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes).ok()?;
    String::from_utf8(bytes).ok()
}

fn write_string(w: &mut impl Write, s: &str) -> std::io::Result<()> {
    w.write_u32::<LittleEndian>(s.len() as u32)?;
    w.write_all(s.as_bytes())
}
