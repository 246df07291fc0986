//! Decoded frame payloads, per-track audio properties, and content hashing.
//!
//! A frame's content hash is the identity the seek-and-verify machinery matches
//! against, so the byte ordering fed to the digest is part of the index format:
//! - planar frames hash plane 0, plane 1, … plane C−1, each
//!   `bytes_per_sample * num_samples` long,
//! - interleaved frames hash their single region of
//!   `bytes_per_sample * channels * num_samples`,
//! always in the raw little-endian memory order of the sample payload.

use md5::{Digest, Md5};

/// Sentinel for a frame without a usable container timestamp.
pub const NO_PTS: i64 = i64::MIN;

/// Static per-track properties, fixed once indexing completes.
///
/// `num_frames` and `num_samples` are estimates derived from container metadata
/// until the track index is built, at which point they are replaced by exact
/// values from the index.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AudioProperties {
    pub is_float: bool,
    pub bytes_per_sample: u32,
    pub bits_per_sample: u32,
    pub sample_rate: u32,
    pub channels: u32,
    /// Channel layout bitmask. Ambisonic and custom channel orders are rejected
    /// at open; unspecified orders get a default mask synthesized from the
    /// channel count.
    pub channel_layout: u64,
    pub num_frames: i64,
    pub num_samples: i64,
    /// Presentation time of the first frame, in seconds.
    pub start_time: f64,
}

/// PCM layout of one decoded frame.
#[derive(Debug, Clone)]
pub enum FrameData {
    /// One contiguous byte buffer per channel.
    Planar(Vec<Vec<u8>>),
    /// One buffer with channels interleaved sample-by-sample.
    Interleaved(Vec<u8>),
}

/// One decoded audio frame.
///
/// Frames are immutable once produced by a backend; the cache and callers share
/// them through `Arc<AudioFrame>`, so a cached frame can never change under a
/// caller holding a handle.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Container timestamp, or [`NO_PTS`].
    pub pts: i64,
    /// Samples per channel in this frame.
    pub num_samples: i64,
    pub bytes_per_sample: u32,
    pub channels: u32,
    pub data: FrameData,
}

impl AudioFrame {
    /// MD5 digest of the raw decoded PCM bytes in the defined plane order.
    pub fn content_hash(&self) -> [u8; 16] {
        let mut hasher = Md5::new();
        match &self.data {
            FrameData::Planar(planes) => {
                for plane in planes {
                    hasher.update(plane);
                }
            }
            FrameData::Interleaved(data) => hasher.update(data),
        }
        hasher.finalize().into()
    }

    /// Total size of the decoded sample buffers, excluding headers.
    ///
    /// This is the figure the byte-bounded frame cache accounts with.
    pub fn byte_size(&self) -> usize {
        match &self.data {
            FrameData::Planar(planes) => planes.iter().map(Vec::len).sum(),
            FrameData::Interleaved(data) => data.len(),
        }
    }

    pub fn is_planar(&self) -> bool {
        matches!(self.data, FrameData::Planar(_))
    }

    /// Borrow the plane for `channel`, if this frame is planar.
    pub fn plane(&self, channel: usize) -> Option<&[u8]> {
        match &self.data {
            FrameData::Planar(planes) => planes.get(channel).map(Vec::as_slice),
            FrameData::Interleaved(_) => None,
        }
    }
}

/// Synthesize a channel mask for a stream that did not declare one.
///
/// Mirrors the common positional defaults: mono is front-center, stereo is
/// front-left + front-right, anything else fills the low positional bits.
pub fn default_channel_mask(channels: u32) -> u64 {
    match channels {
        0 => 0,
        1 => 0x4,
        2 => 0x3,
        n if n >= 64 => u64::MAX,
        n => (1u64 << n) - 1,
    }
}
