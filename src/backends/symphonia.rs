//! Built-in codec backend powered by Symphonia.
//!
//! `SymphoniaBackend` wraps one probed container plus one decoder and
//! implements the weak [`DecodeBackend`] contract: forward decode is exact,
//! seeking is best-effort (coarse, keyframe at or before the requested
//! timestamp), and the caller re-establishes the true position by hash
//! matching.

use std::fs::File;
use std::path::{Path, PathBuf};

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Channels, Signal};
use symphonia::core::codecs::{CodecParameters, Decoder};
use symphonia::core::formats::{FormatReader, SeekMode, SeekTo};
use symphonia::core::sample::{Sample, i24, u24};

use crate::backend::{BackendFactory, DecodeBackend};
use crate::decode::{decode_packet, make_decoder_for_track};
use crate::demux::{format_options_from_map, next_track_packet, probe_source, select_track};
use crate::error::{Error, Result};
use crate::frame::{AudioFrame, AudioProperties, FrameData, NO_PTS, default_channel_mask};
use crate::opts::SourceOpts;

/// Opens [`SymphoniaBackend`] instances for one source file.
///
/// Validates open-time arguments once; every [`BackendFactory::open`] call
/// re-probes the file so each decoder owns an independent container position.
pub struct SymphoniaFactory {
    path: PathBuf,
    opts: SourceOpts,
}

impl SymphoniaFactory {
    pub fn new(path: impl AsRef<Path>, opts: &SourceOpts) -> Result<Self> {
        if opts.drc_scale < 0.0 {
            return Err(Error::invalid_argument("drc_scale must be non-negative"));
        }

        Ok(Self {
            path: path.as_ref().to_path_buf(),
            opts: opts.clone(),
        })
    }
}

impl BackendFactory for SymphoniaFactory {
    fn open(&self) -> Result<Box<dyn DecodeBackend>> {
        Ok(Box::new(SymphoniaBackend::open(&self.path, &self.opts)?))
    }
}

/// The decoded-format identity of one frame.
///
/// Used to drop frames whose format changes mid-stream when variable format
/// is disabled, and to carry rate/layout information from the probe frame
/// into the reported properties.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FrameFormat {
    rate: u32,
    channels: Channels,
    kind: u8,
    bytes_per_sample: u32,
    is_float: bool,
}

struct ConvertedBuffer {
    planes: Vec<Vec<u8>>,
    num_samples: usize,
    format: FrameFormat,
}

/// One open container + decoder over a single audio track.
pub struct SymphoniaBackend {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    track_number: i32,
    codec_params: CodecParameters,
    variable_format: bool,
    first_format: Option<FrameFormat>,
    /// Frame decoded by the property probe, delivered as frame 0.
    pending: Option<AudioFrame>,
    props: Option<AudioProperties>,
    current_frame: i64,
    current_sample: i64,
    seeked: bool,
    more: bool,
    bytes_read: i64,
    source_len: i64,
}

impl SymphoniaBackend {
    pub fn open(path: &Path, opts: &SourceOpts) -> Result<Self> {
        if opts.drc_scale < 0.0 {
            return Err(Error::invalid_argument("drc_scale must be non-negative"));
        }

        let file = File::open(path).map_err(|e| Error::Open {
            message: format!("couldn't open '{}'", path.display()),
            source: Some(Box::new(e)),
        })?;
        let source_len = file.metadata().map(|m| m.len() as i64).unwrap_or(-1);

        let ext = path.extension().and_then(|e| e.to_str());
        let format = probe_source(
            Box::new(file),
            ext,
            format_options_from_map(&opts.backend_options),
        )?;

        let (track_number, track) = select_track(format.as_ref(), opts.track)?;
        let decoder = make_decoder_for_track(&track)?;

        Ok(Self {
            format,
            decoder,
            track_id: track.id,
            track_number,
            codec_params: track.codec_params,
            variable_format: opts.variable_format,
            first_format: None,
            pending: None,
            props: None,
            current_frame: 0,
            current_sample: 0,
            seeked: false,
            more: true,
            bytes_read: 0,
            source_len,
        })
    }

    /// Decode forward until a usable frame appears, without touching the
    /// position counters.
    fn pull_frame(&mut self) -> Option<AudioFrame> {
        loop {
            let packet = next_track_packet(&mut self.format, self.track_id)?;
            self.bytes_read += packet.buf().len() as i64;
            let pts = packet.ts() as i64;

            let decoded = match decode_packet(&mut self.decoder, &packet) {
                Ok(Some(buf)) => buf,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "fatal decoder error, stopping decode");
                    return None;
                }
            };

            if decoded.frames() == 0 {
                continue;
            }

            let converted = convert_buffer(&decoded);

            if let Some(first) = self.first_format {
                if !self.variable_format && first != converted.format {
                    tracing::debug!("dropping frame with mid-stream format change");
                    continue;
                }
            } else {
                self.first_format = Some(converted.format);
            }

            return Some(AudioFrame {
                pts,
                num_samples: converted.num_samples as i64,
                bytes_per_sample: converted.format.bytes_per_sample,
                channels: converted.format.channels.count() as u32,
                data: FrameData::Planar(converted.planes),
            });
        }
    }
}

impl DecodeBackend for SymphoniaBackend {
    fn next_frame(&mut self) -> Result<Option<AudioFrame>> {
        if !self.more {
            return Ok(None);
        }

        let frame = match self.pending.take() {
            Some(f) => Some(f),
            None => self.pull_frame(),
        };

        match frame {
            Some(f) => {
                self.current_frame = self.current_frame.wrapping_add(1);
                self.current_sample = self.current_sample.wrapping_add(f.num_samples);
                Ok(Some(f))
            }
            None => {
                self.more = false;
                Ok(None)
            }
        }
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
        self.pending = None;
        self.current_frame = i64::MIN;
        self.current_sample = i64::MIN;

        let ok = pts >= 0
            && self
                .format
                .seek(
                    SeekMode::Coarse,
                    SeekTo::TimeStamp {
                        ts: pts as u64,
                        track_id: self.track_id,
                    },
                )
                .is_ok();

        self.decoder.reset();
        // If the container can't seek there's no point decoding further either.
        self.more = ok;
        ok
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
        if let Some(props) = self.props {
            return Ok(props);
        }

        debug_assert_eq!(self.current_frame, 0);

        let Some(frame) = self.pull_frame() else {
            return Err(Error::open("track contains no decodable frames"));
        };
        let format = self
            .first_format
            .ok_or_else(|| Error::internal("probe produced a frame without format info"))?;

        if format.bytes_per_sample == 0 {
            return Err(Error::unsupported_format("codec returned zero size audio"));
        }

        let channels = format.channels.count() as u32;
        let channel_layout = if format.channels.bits() != 0 {
            format.channels.bits() as u64
        } else {
            default_channel_mask(channels)
        };

        // Estimate; superseded by the exact sum of frame lengths once the
        // track index exists.
        let delay = self.codec_params.delay.unwrap_or(0) as i64;
        let num_samples = self
            .codec_params
            .n_frames
            .map(|n| n as i64 - delay)
            .unwrap_or(0)
            .max(0);

        let start_time = match (self.codec_params.time_base, frame.pts) {
            (Some(tb), pts) if pts != NO_PTS => {
                (tb.numer as f64 * pts as f64) / tb.denom as f64
            }
            _ => 0.0,
        };

        let props = AudioProperties {
            is_float: format.is_float,
            bytes_per_sample: format.bytes_per_sample,
            bits_per_sample: self
                .codec_params
                .bits_per_sample
                .unwrap_or(format.bytes_per_sample * 8),
            sample_rate: format.rate,
            channels,
            channel_layout,
            num_frames: 0,
            num_samples,
            start_time,
        };

        self.pending = Some(frame);
        self.props = Some(props);
        Ok(props)
    }

    fn track(&self) -> i32 {
        self.track_number
    }

    fn source_position(&self) -> i64 {
        self.bytes_read
    }

    fn source_size(&self) -> i64 {
        self.source_len
    }
}

fn convert_buffer(buf: &AudioBufferRef<'_>) -> ConvertedBuffer {
    use AudioBufferRef as A;
    match buf {
        A::U8(b) => converted(b, false, 0, |s: u8| [s]),
        A::U16(b) => converted(b, false, 1, |s: u16| s.to_le_bytes()),
        A::U24(b) => converted(b, false, 2, |s: u24| s.inner().to_le_bytes()),
        A::U32(b) => converted(b, false, 3, |s: u32| s.to_le_bytes()),
        A::S8(b) => converted(b, false, 4, |s: i8| [s as u8]),
        A::S16(b) => converted(b, false, 5, |s: i16| s.to_le_bytes()),
        A::S24(b) => converted(b, false, 6, |s: i24| s.inner().to_le_bytes()),
        A::S32(b) => converted(b, false, 7, |s: i32| s.to_le_bytes()),
        A::F32(b) => converted(b, true, 8, |s: f32| s.to_le_bytes()),
        A::F64(b) => converted(b, true, 9, |s: f64| s.to_le_bytes()),
    }
}

/// Serialize one typed Symphonia buffer into per-channel little-endian planes.
///
/// 24-bit samples travel in 4-byte containers; `bits_per_sample` in the
/// reported properties carries the real resolution.
fn converted<S: Sample, const N: usize>(
    buf: &AudioBuffer<S>,
    is_float: bool,
    kind: u8,
    to_bytes: impl Fn(S) -> [u8; N],
) -> ConvertedBuffer {
    let spec = *buf.spec();
    let num_samples = buf.frames();

    let planes = (0..spec.channels.count())
        .map(|c| {
            let mut plane = Vec::with_capacity(num_samples * N);
            for &s in buf.chan(c) {
                plane.extend_from_slice(&to_bytes(s));
            }
            plane
        })
        .collect();

    ConvertedBuffer {
        planes,
        num_samples,
        format: FrameFormat {
            rate: spec.rate,
            channels: spec.channels,
            kind,
            bytes_per_sample: N as u32,
            is_float,
        },
    }
}
