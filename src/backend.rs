use crate::Result;
use crate::frame::{AudioFrame, AudioProperties};

/// Pluggable codec backend used by [`crate::source::AudioSource`].
///
/// A backend wraps one open container + one audio decoder and exposes the
/// track as a forward-only stream of decoded frames with a best-effort seek.
/// The contract is deliberately weak: after [`DecodeBackend::seek`] the
/// decoder may be positioned at the wrong frame, emit garbage, or drop
/// frames entirely. Correctness is established by the caller's
/// seek-and-verify machinery, never assumed from the backend.
///
/// Backends issue one request at a time; any threading inside the decoder is
/// invisible to callers.
pub trait DecodeBackend {
    /// Decode and return the next frame, or `None` at end of stream.
    ///
    /// Advances the current frame number and sample position by one frame.
    fn next_frame(&mut self) -> Result<Option<AudioFrame>>;

    /// Decode and discard `count` frames.
    ///
    /// Returns `false` once the stream ends before `count` frames were
    /// skipped.
    fn skip_frames(&mut self, count: i64) -> bool;

    /// Best-effort seek to the keyframe at or before `pts`.
    ///
    /// Flushes decoder state and invalidates the current position (frame
    /// number and sample position become `i64::MIN`) until the caller
    /// re-anchors it via [`DecodeBackend::set_position`]. Returns `false`
    /// when the container cannot seek at all.
    fn seek(&mut self, pts: i64) -> bool;

    /// Frame number of the next frame [`DecodeBackend::next_frame`] will
    /// return, or `i64::MIN` after an unanchored seek.
    fn current_frame_number(&self) -> i64;

    /// Sample offset of the next frame, or `i64::MIN` after an unanchored
    /// seek.
    fn current_sample_position(&self) -> i64;

    /// Trusted position override, called once the caller has identified the
    /// decoder's true position by hash matching.
    fn set_position(&mut self, frame: i64, sample: i64);

    /// Whether this backend has ever seeked. Cleared only by construction.
    fn has_seeked(&self) -> bool;

    /// Whether more frames may still be decoded.
    fn has_more_frames(&self) -> bool;

    /// Probe the track's static properties.
    ///
    /// Probing decodes one frame to observe the real sample format; that
    /// frame stays pending and is delivered as frame 0 by the next
    /// [`DecodeBackend::next_frame`] call. Must be called before any frame
    /// has been consumed.
    fn audio_properties(&mut self) -> Result<AudioProperties>;

    /// Resolved container track number.
    fn track(&self) -> i32;

    /// Bytes of the source consumed so far, for progress reporting.
    fn source_position(&self) -> i64;

    /// Total source size in bytes, or `-1` if unknown.
    fn source_size(&self) -> i64;
}

/// Opens fresh [`DecodeBackend`] instances for one source.
///
/// The decoder pool spawns new decoders on demand (for seeking, for linear
/// re-decodes after the pool evicts a slot, and for the indexing pass), so the
/// source holds a factory rather than a single decoder.
pub trait BackendFactory {
    fn open(&self) -> Result<Box<dyn DecodeBackend>>;
}
