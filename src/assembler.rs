//! Sample assembly: copying decoded frames into caller-provided channel
//! buffers.
//!
//! Output is always planar, one mutable byte slice per channel, each advanced
//! by an explicit per-channel cursor. Planar frames copy one contiguous
//! sub-range per channel; interleaved frames are deinterleaved
//! sample-by-sample. The edges of a request that fall outside the track are
//! zero-filled so callers always receive exactly the samples they asked for.

use crate::error::{Error, Result};
use crate::frame::{AudioFrame, FrameData};

/// Caller-provided per-channel output buffers plus per-channel write cursors.
pub(crate) struct ChannelWriters<'a, 'b> {
    bufs: &'a mut [&'b mut [u8]],
    offsets: Vec<usize>,
    bytes_per_sample: usize,
}

impl<'a, 'b> ChannelWriters<'a, 'b> {
    pub(crate) fn new(bufs: &'a mut [&'b mut [u8]], bytes_per_sample: usize) -> Self {
        let offsets = vec![0; bufs.len()];
        Self {
            bufs,
            offsets,
            bytes_per_sample,
        }
    }

    /// Write `samples` zeros into every channel and advance the cursors.
    pub(crate) fn zero_head(&mut self, samples: usize) {
        let len = samples * self.bytes_per_sample;
        for (buf, off) in self.bufs.iter_mut().zip(self.offsets.iter_mut()) {
            buf[*off..*off + len].fill(0);
            *off += len;
        }
    }

    /// Write `samples` zeros into every channel starting `skip` samples past
    /// the current cursor, without advancing.
    ///
    /// Used for the past-end-of-track tail: the valid frame copies still have
    /// `skip` samples to write before the zeroed region.
    pub(crate) fn zero_tail(&mut self, skip: usize, samples: usize) {
        let start = skip * self.bytes_per_sample;
        let len = samples * self.bytes_per_sample;
        for (buf, off) in self.bufs.iter_mut().zip(self.offsets.iter()) {
            buf[*off + start..*off + start + len].fill(0);
        }
    }

    /// Copy `samples` from each source plane, starting `sample_offset` samples
    /// into the plane, and advance the cursors.
    pub(crate) fn copy_planar(
        &mut self,
        planes: &[Vec<u8>],
        sample_offset: usize,
        samples: usize,
    ) -> Result<()> {
        let len = samples * self.bytes_per_sample;
        let src_start = sample_offset * self.bytes_per_sample;

        for (c, (buf, off)) in self
            .bufs
            .iter_mut()
            .zip(self.offsets.iter_mut())
            .enumerate()
        {
            let plane = planes
                .get(c)
                .ok_or_else(|| Error::internal("decoded frame is missing a channel plane"))?;
            buf[*off..*off + len].copy_from_slice(&plane[src_start..src_start + len]);
            *off += len;
        }

        Ok(())
    }

    /// Deinterleave `samples` into the channel buffers, starting
    /// `sample_offset` samples into the interleaved region, and advance the
    /// cursors.
    pub(crate) fn deinterleave(
        &mut self,
        data: &[u8],
        channels: usize,
        sample_offset: usize,
        samples: usize,
    ) {
        let bps = self.bytes_per_sample;
        let stride = channels * bps;
        let mut src = sample_offset * stride;

        for _ in 0..samples {
            for (c, (buf, off)) in self
                .bufs
                .iter_mut()
                .zip(self.offsets.iter_mut())
                .enumerate()
            {
                let channel_src = src + c * bps;
                buf[*off..*off + bps].copy_from_slice(&data[channel_src..channel_src + bps]);
                *off += bps;
            }
            src += stride;
        }
    }
}

/// Copy the part of `frame` that overlaps `[start, start + count)` into the
/// writers. `frame_start` is the frame's first sample offset within the track.
///
/// Returns the number of samples written. The caller has already verified the
/// range against the index, so a cursor outside the frame is a contract
/// violation.
pub(crate) fn fill_from_frame(
    writers: &mut ChannelWriters<'_, '_>,
    frame: &AudioFrame,
    frame_start: i64,
    start: i64,
    count: i64,
) -> Result<i64> {
    if start < frame_start || start >= frame_start + frame.num_samples {
        return Err(Error::internal(
            "sample cursor fell outside the fetched frame",
        ));
    }

    let length = count.min(frame.num_samples - (start - frame_start));
    if length <= 0 {
        return Ok(0);
    }
    let offset = (start - frame_start) as usize;

    match &frame.data {
        FrameData::Planar(planes) => writers.copy_planar(planes, offset, length as usize)?,
        FrameData::Interleaved(data) => {
            writers.deinterleave(data, frame.channels as usize, offset, length as usize)
        }
    }

    Ok(length)
}
