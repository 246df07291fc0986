#![allow(dead_code)]

//! Deterministic mock backend for exercising the seek-and-verify machinery.
//!
//! The mock serves a synthetic track whose frame contents derive from per-frame
//! seeds, so identical seeds give byte-identical frames (for duplicate-content
//! runs) and any frame can be regenerated for comparison. Misbehavior is
//! injected through shared atomic knobs: displaced seek landings, failing
//! seeks, post-seek silence, and corrupted frames.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};

use samplecue::Result;
use samplecue::backend::{BackendFactory, DecodeBackend};
use samplecue::frame::{AudioFrame, AudioProperties, FrameData, NO_PTS};
use samplecue::opts::SourceOpts;
use samplecue::source::AudioSource;

pub const FRAME_SAMPLES: i64 = 64;
pub const CHANNELS: u32 = 2;
pub const BYTES_PER_SAMPLE: u32 = 2;

/// Frame layout and content seeds for one synthetic track.
pub struct MockTrack {
    /// Content seed per frame; equal seeds produce byte-identical frames.
    pub payloads: Vec<u32>,
    /// Per-frame container timestamp ([`NO_PTS`] allowed).
    pub pts: Vec<i64>,
    /// Serve frames interleaved instead of planar.
    pub interleaved: bool,
}

impl MockTrack {
    /// A track where every frame has unique content and a valid PTS.
    pub fn unique(frames: usize) -> Self {
        Self {
            payloads: (0..frames as u32).collect(),
            pts: (0..frames).map(|i| i as i64 * 100).collect(),
            interleaved: false,
        }
    }

    /// Like [`MockTrack::unique`] but the given range shares one payload, so
    /// all its frames hash identically.
    pub fn with_duplicate_run(frames: usize, run: std::ops::Range<usize>) -> Self {
        let mut track = Self::unique(frames);
        for i in run {
            track.payloads[i] = u32::MAX;
        }
        track
    }

    /// Like [`MockTrack::unique`] but no frame carries a usable timestamp.
    pub fn without_pts(frames: usize) -> Self {
        let mut track = Self::unique(frames);
        track.pts = vec![NO_PTS; frames];
        track
    }

    pub fn num_frames(&self) -> usize {
        self.payloads.len()
    }

    pub fn frame(&self, i: usize) -> AudioFrame {
        self.frame_from_seed(i, self.payloads[i])
    }

    /// The same frame with deliberately different content, for simulating a
    /// decoder that emits the wrong payload.
    pub fn corrupt_frame(&self, i: usize) -> AudioFrame {
        self.frame_from_seed(i, self.payloads[i] ^ 0xdead_beef)
    }

    fn frame_from_seed(&self, i: usize, seed: u32) -> AudioFrame {
        let mut planes = Vec::with_capacity(CHANNELS as usize);
        for c in 0..CHANNELS {
            let mut plane = Vec::with_capacity((FRAME_SAMPLES as usize) * 2);
            let mut x = seed.wrapping_mul(2654435761).wrapping_add(c.wrapping_mul(97));
            for _ in 0..FRAME_SAMPLES {
                x = x.wrapping_mul(1664525).wrapping_add(1013904223);
                plane.extend_from_slice(&(x as u16).to_le_bytes());
            }
            planes.push(plane);
        }

        let data = if self.interleaved {
            let mut interleaved = Vec::with_capacity(planes.len() * planes[0].len());
            for s in 0..FRAME_SAMPLES as usize {
                for plane in &planes {
                    interleaved.extend_from_slice(&plane[s * 2..s * 2 + 2]);
                }
            }
            FrameData::Interleaved(interleaved)
        } else {
            FrameData::Planar(planes)
        };

        AudioFrame {
            pts: self.pts[i],
            num_samples: FRAME_SAMPLES,
            bytes_per_sample: BYTES_PER_SAMPLE,
            channels: CHANNELS,
            data,
        }
    }
}

/// Misbehavior knobs shared by every decoder the factory opens.
///
/// All fields are atomics so tests can flip them mid-run (e.g. corrupt a frame
/// only after indexing has finished).
#[derive(Default)]
pub struct MockBehavior {
    /// Frames the decoder lands *before* the requested seek position
    /// (mimicking a keyframe at or before the target). Negative values land
    /// past the target.
    pub seek_displacement: AtomicI64,
    /// Every seek reports failure, as an unseekable container would.
    pub fail_seeks: AtomicBool,
    /// Seeks position the decoder at end-of-stream, so nothing decodes after.
    pub eof_after_seek: AtomicBool,
    /// Emit corrupted content for this frame index on decoders that have
    /// seeked (`-1` = off).
    pub corrupt_after_seek_at: AtomicI64,
    /// Emit corrupted content for this frame index on every decoder
    /// (`-1` = off).
    pub corrupt_always_at: AtomicI64,
    /// Total seeks issued across all decoders.
    pub seek_calls: AtomicUsize,
}

impl MockBehavior {
    pub fn new() -> Arc<Self> {
        let behavior = Self::default();
        behavior.corrupt_after_seek_at.store(-1, Ordering::Relaxed);
        behavior.corrupt_always_at.store(-1, Ordering::Relaxed);
        Arc::new(behavior)
    }
}

pub struct MockBackend {
    track: Arc<MockTrack>,
    behavior: Arc<MockBehavior>,
    /// Index of the next frame the decoder will actually deliver.
    next: usize,
    current_frame: i64,
    current_sample: i64,
    seeked: bool,
    more: bool,
}

impl DecodeBackend for MockBackend {
    fn next_frame(&mut self) -> Result<Option<AudioFrame>> {
        if !self.more {
            return Ok(None);
        }
        if self.next >= self.track.num_frames() {
            self.more = false;
            return Ok(None);
        }

        let i = self.next;
        let corrupt_always = self.behavior.corrupt_always_at.load(Ordering::Relaxed);
        let corrupt_seeked = self.behavior.corrupt_after_seek_at.load(Ordering::Relaxed);
        let frame = if corrupt_always == i as i64
            || (self.seeked && corrupt_seeked == i as i64)
        {
            self.track.corrupt_frame(i)
        } else {
            self.track.frame(i)
        };

        self.next += 1;
        self.current_frame = self.current_frame.wrapping_add(1);
        self.current_sample = self.current_sample.wrapping_add(frame.num_samples);
        Ok(Some(frame))
    }

    fn skip_frames(&mut self, mut count: i64) -> bool {
        while count > 0 {
            match self.next_frame() {
                Ok(Some(_)) => count -= 1,
                _ => break,
            }
        }
        self.more
    }

    fn seek(&mut self, pts: i64) -> bool {
        self.seeked = true;
        self.behavior.seek_calls.fetch_add(1, Ordering::Relaxed);
        self.current_frame = i64::MIN;
        self.current_sample = i64::MIN;

        if self.behavior.fail_seeks.load(Ordering::Relaxed) {
            self.more = false;
            return false;
        }

        if self.behavior.eof_after_seek.load(Ordering::Relaxed) {
            self.next = self.track.num_frames();
            self.more = true;
            return true;
        }

        let target = self
            .track
            .pts
            .iter()
            .position(|&p| p == pts)
            .unwrap_or(0) as i64;
        let displacement = self.behavior.seek_displacement.load(Ordering::Relaxed);
        let landed = (target - displacement).clamp(0, self.track.num_frames() as i64 - 1);

        self.next = landed as usize;
        self.more = true;
        true
    }

    fn current_frame_number(&self) -> i64 {
        self.current_frame
    }

    fn current_sample_position(&self) -> i64 {
        self.current_sample
    }

    fn set_position(&mut self, frame: i64, sample: i64) {
        self.current_frame = frame;
        self.current_sample = sample;
    }

    fn has_seeked(&self) -> bool {
        self.seeked
    }

    fn has_more_frames(&self) -> bool {
        self.more
    }

    fn audio_properties(&mut self) -> Result<AudioProperties> {
        Ok(AudioProperties {
            is_float: false,
            bytes_per_sample: BYTES_PER_SAMPLE,
            bits_per_sample: 16,
            sample_rate: 48_000,
            channels: CHANNELS,
            channel_layout: 0x3,
            num_frames: 0,
            num_samples: 0,
            start_time: 0.0,
        })
    }

    fn track(&self) -> i32 {
        0
    }

    fn source_position(&self) -> i64 {
        self.next as i64
    }

    fn source_size(&self) -> i64 {
        self.track.num_frames() as i64
    }
}

pub struct MockFactory {
    pub track: Arc<MockTrack>,
    pub behavior: Arc<MockBehavior>,
}

impl BackendFactory for MockFactory {
    fn open(&self) -> Result<Box<dyn DecodeBackend>> {
        Ok(Box::new(MockBackend {
            track: Arc::clone(&self.track),
            behavior: Arc::clone(&self.behavior),
            next: 0,
            current_frame: 0,
            current_sample: 0,
            seeked: false,
            more: true,
        }))
    }
}

/// Open an `AudioSource` over a mock track with the default options
/// (in-memory index only, preroll 20).
pub fn open_source(track: Arc<MockTrack>, behavior: Arc<MockBehavior>) -> AudioSource {
    let opts = SourceOpts::default();
    AudioSource::with_factory(
        Box::new(MockFactory { track, behavior }),
        None,
        &opts,
        None,
    )
    .expect("mock source should open")
}

/// Hash the reference content of frame `i`.
pub fn reference_hash(track: &MockTrack, i: usize) -> [u8; 16] {
    track.frame(i).content_hash()
}

/// Drop everything from the source's frame cache.
pub fn clear_cache(source: &mut AudioSource) {
    source.set_max_cache_size(0);
    source.set_max_cache_size(100 * 1024 * 1024);
}
