// src/demux.rs

//! Demux helpers for Symphonia.
//!
//! This module keeps container probing and packet iteration logic isolated from
//! the rest of the decode machinery.
//!
//! Responsibilities:
//! - Probe a `MediaSource` into a `FormatReader`
//! - Resolve a track request (`-1` = first audio, `>= 0` = container index)
//! - Map opaque backend options onto `FormatOptions`
//! - Provide a `next_track_packet` helper that treats every terminal container
//!   condition as end-of-stream

use std::collections::BTreeMap;

use symphonia::core::codecs::CODEC_TYPE_NULL;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, Packet, Track};
use symphonia::core::io::{MediaSource, MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Error, Result};

/// Probe the container and return its format reader.
///
/// `hint_extension` can improve probe accuracy for ambiguous inputs
/// (e.g. "mp4", "ts", "webm", "mkv", "ogg").
pub fn probe_source(
    source: Box<dyn MediaSource>,
    hint_extension: Option<&str>,
    format_opts: FormatOptions,
) -> Result<Box<dyn FormatReader>> {
    let mss_opts = MediaSourceStreamOptions {
        // Symphonia expects a power-of-two buffer > 32KiB for good probing behavior.
        buffer_len: 256 * 1024,
    };

    let mss = MediaSourceStream::new(source, mss_opts);

    let mut hint = Hint::new();
    if let Some(ext) = hint_extension {
        hint.with_extension(ext);
    }

    let metadata_opts: MetadataOptions = Default::default();

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &format_opts, &metadata_opts)
        .map_err(|e| Error::Open {
            message: "couldn't probe container".to_string(),
            source: Some(Box::new(e)),
        })?;

    Ok(probed.format)
}

/// Resolve a track request against the probed container.
///
/// Track selection policy:
/// - `requested == -1` picks the first track with a decodable codec
/// - `requested >= 0` picks the track at that container index and fails if the
///   index is out of range or the track is not decodable audio
///
/// Returns the resolved container index together with a clone of the track.
pub fn select_track(format: &dyn FormatReader, requested: i32) -> Result<(i32, Track)> {
    let tracks = format.tracks();

    let resolved = if requested < 0 {
        tracks
            .iter()
            .position(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::open("no audio track found"))?
    } else {
        requested as usize
    };

    let track = tracks
        .get(resolved)
        .ok_or_else(|| Error::open(format!("invalid track index {requested}")))?;

    if track.codec_params.codec == CODEC_TYPE_NULL {
        return Err(Error::open(format!(
            "track {resolved} is not a decodable audio track"
        )));
    }

    Ok((resolved as i32, track.clone()))
}

/// Map the opaque backend option map onto Symphonia's `FormatOptions`.
///
/// Recognized keys: `enable_gapless`, `prebuild_seek_index`,
/// `seek_index_fill_rate`. Unknown keys are ignored here but still participate
/// in index identity upstream.
pub fn format_options_from_map(map: &BTreeMap<String, String>) -> FormatOptions {
    let mut opts = FormatOptions::default();

    if let Some(v) = map.get("enable_gapless") {
        opts.enable_gapless = v == "1" || v.eq_ignore_ascii_case("true");
    }
    if let Some(v) = map.get("prebuild_seek_index") {
        opts.prebuild_seek_index = v == "1" || v.eq_ignore_ascii_case("true");
    }
    if let Some(v) = map.get("seek_index_fill_rate") {
        if let Ok(rate) = v.parse() {
            opts.seek_index_fill_rate = rate;
        }
    }

    opts
}

/// Read the next packet belonging to `track_id`, skipping other tracks.
///
/// Every terminal condition collapses to `None`: IO errors are the normal
/// end-of-stream signal, a mid-stream reset means the decoded format can no
/// longer be trusted to match the indexed track, and any other container error
/// leaves nothing further to decode.
pub fn next_track_packet(format: &mut Box<dyn FormatReader>, track_id: u32) -> Option<Packet> {
    loop {
        match format.next_packet() {
            Ok(p) => {
                if p.track_id() == track_id {
                    return Some(p);
                }
            }
            Err(SymphoniaError::IoError(_)) => return None,
            Err(SymphoniaError::ResetRequired) => return None,
            Err(e) => {
                tracing::debug!(error = %e, "container error while reading packets, treating as end of stream");
                return None;
            }
        }
    }
}
