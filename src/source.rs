//! High-level entry point: an audio track addressable by frame number and by
//! sample position.
//!
//! `AudioSource` owns the track index, a byte-bounded frame cache, and a small
//! pool of live decoders. Frame requests resolve through cache → pool →
//! seek-and-verify:
//!
//! 1. If a live decoder already sits between the best seek target and the
//!    requested frame, decode forward from it; no seek.
//! 2. If the best seek target lies within the first 100 frames, decode
//!    linearly from the start; fresh decoders there are cheaper and more
//!    reliable than seeking.
//! 3. Otherwise seek to the target's timestamp and identify the decoder's
//!    true position by matching decoded-frame hashes against the index,
//!    growing the match window up to 10 frames across runs of identical
//!    content.
//! 4. When the position can't be identified, lands beyond the request, or
//!    nothing decodes at all, the target goes into the bad-seek set and the
//!    seek retries at least 100 frames earlier, up to 3 times.
//! 5. Exhausted retries latch the source into permanent linear mode: the
//!    cache is dropped, every decoder is torn down, and all further requests
//!    decode forward on decoders that have never seeked.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::assembler::{ChannelWriters, fill_from_frame};
use crate::backend::BackendFactory;
use crate::backends::symphonia::SymphoniaFactory;
use crate::cache::FrameCache;
use crate::error::{Error, Result};
use crate::frame::{AudioFrame, AudioProperties, NO_PTS};
use crate::index::{self, IndexParams, TrackIndex};
use crate::opts::SourceOpts;
use crate::pool::DecoderPool;

/// Frames below this index are never seek targets; decoding from the start is
/// cheaper and more reliable than seeking near it.
const PREROLL_ZONE: i64 = 100;
/// How far back each retry moves the seek target.
const PREROLL_STRIDE: i64 = 100;
/// Hash-match window size at which multiple candidates mean "unidentifiable".
const MAX_MATCH_WINDOW: usize = 10;
const MAX_RETRY_ATTEMPTS: usize = 3;

/// Progress callback: `(track, bytes_processed, bytes_total)`. The final call
/// after indexing passes `(track, i64::MAX, i64::MAX)`.
pub type ProgressFn<'a> = &'a mut dyn FnMut(i32, i64, i64);

/// The frames covering a sample range, as returned by
/// [`AudioSource::frame_range_by_samples`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    pub first: i64,
    pub last: i64,
    /// Sample offset of frame `first` within the track.
    pub first_sample_pos: i64,
}

/// One audio track with sample-accurate random access.
///
/// Not safe for concurrent use; a source serves one caller at a time.
pub struct AudioSource {
    factory: Box<dyn BackendFactory>,
    props: AudioProperties,
    track: i32,
    index: TrackIndex,
    cache: FrameCache,
    pool: DecoderPool,
    bad_seek_locations: HashSet<i64>,
    linear_mode: bool,
    preroll: i64,
    sample_delay: i64,
}

impl AudioSource {
    /// Open a track of `path` with the built-in Symphonia backend.
    ///
    /// Loads the on-disk index when a valid one exists, otherwise runs the
    /// full linear indexing pass (reporting through `progress`) and persists
    /// the result.
    pub fn open(
        path: impl AsRef<Path>,
        opts: &SourceOpts,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let factory = SymphoniaFactory::new(path, opts)?;
        Self::with_factory(Box::new(factory), Some(path), opts, progress)
    }

    /// Open a track through a custom [`BackendFactory`].
    ///
    /// `index_base` is the path the on-disk index derives its name from; with
    /// `None` (and no `opts.index_path`) the index is rebuilt on every open
    /// and never persisted.
    pub fn with_factory(
        factory: Box<dyn BackendFactory>,
        index_base: Option<&Path>,
        opts: &SourceOpts,
        progress: Option<ProgressFn<'_>>,
    ) -> Result<Self> {
        let mut backend = factory.open()?;
        let mut props = backend.audio_properties()?;
        let track = backend.track();

        let index_file = opts
            .index_path
            .as_deref()
            .or(index_base)
            .map(|base| index::index_file_path(base, track));
        let params = IndexParams {
            track,
            variable_format: opts.variable_format,
            drc_scale: opts.drc_scale,
            backend_options: &opts.backend_options,
        };

        let index = match index_file
            .as_deref()
            .and_then(|p| index::read_index(p, params))
        {
            Some(loaded) => loaded,
            None => {
                let built =
                    index::build_track_index(factory.as_ref(), track, progress, opts.cancel.as_deref())?;
                if let Some(p) = index_file.as_deref() {
                    if let Err(e) = index::write_index(p, params, &built) {
                        debug!(error = %e, path = %p.display(), "couldn't persist track index");
                    }
                }
                built
            }
        };

        // The estimates from the property probe are now superseded by exact
        // values from the index.
        props.num_frames = index.num_frames();
        props.num_samples = index.num_samples();

        let mut pool = DecoderPool::new(opts.pool_capacity);
        pool.install(backend);

        Ok(Self {
            factory,
            props,
            track,
            index,
            cache: FrameCache::new(opts.max_cache_bytes),
            pool,
            bad_seek_locations: HashSet::new(),
            linear_mode: false,
            preroll: opts.seek_preroll.max(0),
            sample_delay: 0,
        })
    }

    pub fn audio_properties(&self) -> &AudioProperties {
        &self.props
    }

    pub fn track(&self) -> i32 {
        self.track
    }

    /// Read-only view of the per-frame index.
    pub fn track_index(&self) -> &TrackIndex {
        &self.index
    }

    pub fn set_max_cache_size(&mut self, bytes: usize) {
        self.cache.set_max_size(bytes);
    }

    /// Frames decoded before a seek target to warm up codec state. Clamped to
    /// `>= 0`.
    pub fn set_seek_preroll(&mut self, frames: i64) {
        self.preroll = frames.max(0);
    }

    /// Leading-silence trim subtracted from every sample request. Defaults to
    /// 0; reserved for codec-reported encoder delay.
    pub fn set_sample_delay(&mut self, samples: i64) {
        self.sample_delay = samples;
    }

    pub fn sample_delay(&self) -> i64 {
        self.sample_delay
    }

    /// Mark frame `n` as a location known to yield incorrect or
    /// unidentifiable decoder placement, excluding it from seek-target
    /// selection for the lifetime of this source.
    pub fn mark_bad_seek_location(&mut self, n: i64) {
        self.bad_seek_locations.insert(n);
    }

    /// Fetch frame `n`.
    ///
    /// `Ok(None)` means `n` is outside `[0, num_frames)`, or verification
    /// failed on a decoder that never seeked (a stale index or a
    /// non-deterministic decoder; delete the index and retry, with
    /// `threads = 1` if the backend decodes threaded).
    pub fn frame(&mut self, n: i64) -> Result<Option<Arc<AudioFrame>>> {
        self.frame_impl(n, false)
    }

    /// Fetch frame `n` without ever seeking, regardless of distance.
    pub fn frame_linear(&mut self, n: i64) -> Result<Option<Arc<AudioFrame>>> {
        self.frame_impl(n, true)
    }

    fn frame_impl(&mut self, n: i64, linear: bool) -> Result<Option<Arc<AudioFrame>>> {
        if n < 0 || n >= self.props.num_frames {
            return Ok(None);
        }

        if let Some(frame) = self.cache.get(n) {
            return Ok(Some(frame));
        }

        if linear || self.linear_mode {
            // Once latched, only decoders that never seeked may serve requests.
            self.frame_linear_internal(n, -1, 0, self.linear_mode)
        } else {
            self.frame_internal(n)
        }
    }

    fn frame_internal(&mut self, n: i64) -> Result<Option<Arc<AudioFrame>>> {
        let seek_target = self.pick_seek_target(n);

        // Close enough to the start that seeking can't win.
        if seek_target < PREROLL_ZONE {
            return self.frame_linear_internal(n, -1, 0, false);
        }

        // A decoder is already inside the optimal zone; seeking is out of the
        // question.
        if self.pool.has_decoder_in_range(seek_target, n) {
            return self.frame_linear_internal(n, -1, 0, false);
        }

        let slot = self.pool.acquire_for_seek(self.factory.as_ref())?;
        self.seek_and_decode(n, seek_target, slot, 0)
    }

    /// Largest index `>= PREROLL_ZONE` at or before `n - preroll` with a valid
    /// PTS that isn't a known bad seek location, or `-1`.
    fn pick_seek_target(&self, n: i64) -> i64 {
        let mut i = (n - self.preroll).min(self.index.num_frames() - 1);
        while i >= PREROLL_ZONE {
            let info = &self.index.frames[i as usize];
            if info.pts != NO_PTS && !self.bad_seek_locations.contains(&i) {
                return i;
            }
            i -= 1;
        }
        -1
    }

    fn seek_and_decode(
        &mut self,
        n: i64,
        seek_target: i64,
        slot: usize,
        depth: usize,
    ) -> Result<Option<Arc<AudioFrame>>> {
        let pts = self.index.frames[seek_target as usize].pts;

        let Some(backend) = self.pool.backend_mut(slot) else {
            return Err(Error::internal("seek slot lost its decoder"));
        };
        if !backend.seek(pts) {
            debug!(requested = n, "source can't seek, latching linear mode");
            self.set_linear_mode();
            return self.frame_linear_internal(n, -1, 0, false);
        }

        // Throw away half the preroll to let the decoder stabilize before any
        // frame is considered for matching.
        let stabilize = self.preroll / 2;
        if stabilize > 0 {
            backend.skip_frames(stabilize);
        }

        // Recently decoded frames with their hashes, oldest first.
        let mut window: Vec<(AudioFrame, [u8; 16])> = Vec::new();

        loop {
            let Some(backend) = self.pool.backend_mut(slot) else {
                return Err(Error::internal("seek slot lost its decoder"));
            };
            let frame = backend.next_frame()?;
            let ended = frame.is_none();

            if ended && window.is_empty() {
                debug!(
                    requested = n,
                    seek_target, "nothing decoded after seeking, marking bad seek location"
                );
                self.bad_seek_locations.insert(seek_target);
                return self.retry_seek(n, seek_target, slot, depth);
            }

            if let Some(f) = frame {
                let hash = f.content_hash();
                window.push((f, hash));
            }

            let candidates = self.match_candidates(&window, ended);

            let suitable = candidates.iter().any(|&c| c <= n);
            let ambiguous = candidates.len() > 1 && (ended || window.len() >= MAX_MATCH_WINDOW);

            if !suitable || ambiguous {
                if ambiguous {
                    debug!(
                        requested = n,
                        seek_target,
                        window = window.len(),
                        "seek position can't be identified unambiguously, marking bad seek location"
                    );
                } else {
                    debug!(
                        requested = n,
                        seek_target,
                        "no usable position after seeking, marking bad seek location"
                    );
                }
                self.bad_seek_locations.insert(seek_target);
                return self.retry_seek(n, seek_target, slot, depth);
            }

            if candidates.len() == 1 {
                return self.anchor_and_finish(n, seek_target, slot, candidates[0], window);
            }

            // Multiple candidate positions; decode another frame to
            // disambiguate.
        }
    }

    /// Alignments of `window` inside the index. Once the stream has ended only
    /// the tail alignment is possible.
    fn match_candidates(&self, window: &[(AudioFrame, [u8; 16])], ended: bool) -> Vec<i64> {
        let frames = &self.index.frames;
        let w = window.len();
        if w == 0 || w > frames.len() {
            return Vec::new();
        }

        let matches_at =
            |at: usize| window.iter().enumerate().all(|(j, (_, h))| frames[at + j].hash == *h);

        if ended {
            let at = frames.len() - w;
            if matches_at(at) { vec![at as i64] } else { Vec::new() }
        } else {
            (0..=frames.len() - w)
                .filter(|&i| matches_at(i))
                .map(|i| i as i64)
                .collect()
        }
    }

    /// The window has exactly one alignment: trust it, re-anchor the decoder,
    /// cache the useful frames, and let the linear path fetch any remainder.
    fn anchor_and_finish(
        &mut self,
        n: i64,
        seek_target: i64,
        slot: usize,
        matched: i64,
        window: Vec<(AudioFrame, [u8; 16])>,
    ) -> Result<Option<Arc<AudioFrame>>> {
        if matched < PREROLL_ZONE {
            debug!(
                requested = n,
                matched, "seek landed inside the linear-only zone, this was unexpected"
            );
        }

        let anchor = matched + window.len() as i64;
        let anchor_sample = if anchor < self.index.num_frames() {
            self.index.frames[anchor as usize].start
        } else {
            self.index.num_samples()
        };
        if let Some(backend) = self.pool.backend_mut(slot) {
            backend.set_position(anchor, anchor_sample);
        }

        let mut found = None;
        for (k, (frame, _)) in window.into_iter().enumerate() {
            let frame_number = matched + k as i64;
            if frame_number >= n - self.preroll {
                let handle = Arc::new(frame);
                if frame_number == n {
                    found = Some(Arc::clone(&handle));
                }
                self.cache.insert(frame_number, handle);
            }
        }

        if let Some(frame) = found {
            return Ok(Some(frame));
        }

        self.frame_linear_internal(n, seek_target, 0, false)
    }

    fn retry_seek(
        &mut self,
        n: i64,
        seek_target: i64,
        slot: usize,
        depth: usize,
    ) -> Result<Option<Arc<AudioFrame>>> {
        if depth < MAX_RETRY_ATTEMPTS {
            let next = self.pick_seek_target(seek_target - PREROLL_STRIDE);
            debug!(requested = n, next_target = next, "retrying seek");
            if next < PREROLL_ZONE {
                self.pool.drop_slot(slot);
                self.frame_linear_internal(n, -1, 0, false)
            } else {
                self.seek_and_decode(n, next, slot, depth + 1)
            }
        } else {
            debug!(
                requested = n,
                seek_target, "maximum seek attempts made, latching linear mode"
            );
            self.set_linear_mode();
            self.frame_linear_internal(n, -1, 0, false)
        }
    }

    fn frame_linear_internal(
        &mut self,
        n: i64,
        seek_target: i64,
        depth: usize,
        force_unseeked: bool,
    ) -> Result<Option<Arc<AudioFrame>>> {
        let slot = self
            .pool
            .acquire_for_linear(n, force_unseeked, self.factory.as_ref())?;

        let mut found = None;

        loop {
            let Some(backend) = self.pool.backend_mut(slot) else {
                break;
            };
            let frame_number = backend.current_frame_number();
            if frame_number > n || !backend.has_more_frames() {
                break;
            }

            if frame_number < n - self.preroll {
                backend.skip_frames((n - self.preroll).saturating_sub(frame_number));
            } else {
                let frame = backend.next_frame()?;

                // The central sanity check: it primarily catches decoders that
                // seeked, had their position identified, and still return
                // frames out of order.
                let verified = frame
                    .as_ref()
                    .map(|f| f.content_hash() == self.index.frames[frame_number as usize].hash)
                    .unwrap_or(false);

                if !verified {
                    let seeked = backend.has_seeked();
                    if seeked {
                        debug!(
                            requested = n,
                            frame_number,
                            "frame mismatch on a seeked decoder, marking bad seek location"
                        );
                        debug_assert!(seek_target >= 0);
                        self.bad_seek_locations.insert(seek_target);
                        if depth < MAX_RETRY_ATTEMPTS {
                            let next = self.pick_seek_target(seek_target - PREROLL_STRIDE);
                            debug!(requested = n, next_target = next, "retrying seek");
                            if next < PREROLL_ZONE {
                                self.pool.drop_slot(slot);
                                return self.frame_linear_internal(n, -1, 0, false);
                            } else {
                                return self.seek_and_decode(n, next, slot, depth + 1);
                            }
                        } else {
                            debug!(
                                requested = n,
                                seek_target, "maximum seek attempts made, latching linear mode"
                            );
                            self.set_linear_mode();
                            return self.frame_linear_internal(n, -1, 0, true);
                        }
                    } else {
                        warn!(
                            requested = n,
                            frame_number,
                            "linear decoding produced a frame that does not match the index; \
                             delete the index and retry with threads=1 if you haven't already"
                        );
                        return Ok(None);
                    }
                }

                if let Some(f) = frame {
                    let handle = Arc::new(f);
                    if frame_number == n {
                        found = Some(Arc::clone(&handle));
                    }
                    self.cache.insert(frame_number, handle);
                }
            }

            let exhausted = self
                .pool
                .backend_mut(slot)
                .map(|b| !b.has_more_frames())
                .unwrap_or(true);
            if exhausted {
                self.pool.drop_slot(slot);
                break;
            }
        }

        Ok(found)
    }

    /// Permanently refuse to seek: drop all cached frames and decoders so
    /// every future request decodes forward on a decoder that never seeked.
    fn set_linear_mode(&mut self) {
        debug_assert!(!self.linear_mode);
        if !self.linear_mode {
            debug!("linear decoding mode is now permanently enforced");
            self.linear_mode = true;
            self.cache.clear();
            self.pool.clear();
        }
    }

    /// Map a sample range to the frames covering it.
    ///
    /// Returns `None` for an empty count or a range entirely outside the
    /// track. A `start` before 0 clamps to the first frame; an end past the
    /// track clamps to the last.
    pub fn frame_range_by_samples(&self, start: i64, count: i64) -> Option<FrameRange> {
        if count <= 0 || start >= self.props.num_samples {
            return None;
        }

        let first = if start < 0 {
            0
        } else {
            self.index.frame_containing_sample(start)?
        };

        let end_pos = start + count;
        let last = if end_pos >= self.props.num_samples {
            (self.props.num_frames - 1) as usize
        } else {
            self.index.frame_containing_sample(end_pos - 1)?
        };

        Some(FrameRange {
            first: first as i64,
            last: last as i64,
            first_sample_pos: self.index.frames[first].start,
        })
    }

    /// Fill the caller's planar channel buffers with samples
    /// `[start, start + count)`.
    ///
    /// Positions before the track start or past its end are zero-filled;
    /// every output position is written exactly once. `bufs` must hold one
    /// slice per channel, each at least `count * bytes_per_sample` long.
    pub fn planar_audio(&mut self, bufs: &mut [&mut [u8]], start: i64, count: i64) -> Result<()> {
        if count < 0 {
            return Err(Error::invalid_argument("sample count must be non-negative"));
        }
        if bufs.len() != self.props.channels as usize {
            return Err(Error::invalid_argument(format!(
                "expected {} channel buffers, got {}",
                self.props.channels,
                bufs.len()
            )));
        }
        let bytes_per_sample = self.props.bytes_per_sample as usize;
        let needed = count as usize * bytes_per_sample;
        if bufs.iter().any(|b| b.len() < needed) {
            return Err(Error::invalid_argument(
                "channel buffer too small for the requested sample count",
            ));
        }

        let mut start = start - self.sample_delay;
        let mut count = count;

        let mut writers = ChannelWriters::new(bufs, bytes_per_sample);

        if start < 0 {
            let fill = count.min(-start);
            writers.zero_head(fill as usize);
            start += fill;
            count -= fill;
        }

        if start + count > self.props.num_samples {
            let fill = (start + count - self.props.num_samples).min(count);
            let keep = (self.props.num_samples - start).max(0);
            writers.zero_tail(keep as usize, fill as usize);
            count -= fill;
        }

        if count == 0 {
            return Ok(());
        }

        let Some(range) = self.frame_range_by_samples(start, count) else {
            return Err(Error::internal(
                "no frame range for a non-empty trimmed sample range",
            ));
        };

        let mut frame_start = range.first_sample_pos;
        for i in range.first..=range.last {
            let Some(frame) = self.frame(i)? else {
                return Err(Error::internal(format!(
                    "frame {i} unavailable while assembling samples"
                )));
            };
            let written = fill_from_frame(&mut writers, &frame, frame_start, start, count)?;
            start += written;
            count -= written;
            frame_start += frame.num_samples;
        }

        if count != 0 {
            return Err(Error::internal("failed to provide all requested samples"));
        }

        Ok(())
    }
}
