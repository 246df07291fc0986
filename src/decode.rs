// src/decode.rs

//! Decoder helpers built on top of Symphonia.
//!
//! This module isolates codec-level concerns:
//! - constructing a decoder for a selected audio track
//! - decoding packets into PCM buffers
//! - handling Symphonia's error model in a predictable way
//!
//! Higher layers treat a frame that could not be decoded as a verification
//! miss, so the policy here is to skip recoverable conditions and only surface
//! genuinely fatal decoder errors.

use symphonia::core::audio::AudioBufferRef;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{Packet, Track};

use crate::error::{Error, Result};

/// Create a decoder for the given audio track.
///
/// This uses Symphonia's default codec registry and options.
///
/// Fails if:
/// - the codec is unsupported
/// - the codec parameters are invalid
pub fn make_decoder_for_track(track: &Track) -> Result<Box<dyn Decoder>> {
    let decoder_opts: DecoderOptions = Default::default();

    symphonia::default::get_codecs()
        .make(&track.codec_params, &decoder_opts)
        .map_err(|e| Error::codec("failed to create decoder for audio track", e))
}

/// Decode one packet into a borrowed PCM buffer.
///
/// Return value semantics:
/// - `Ok(Some(buf))` → a decoded audio buffer was produced
/// - `Ok(None)`      → packet was skipped (recoverable condition)
/// - `Err(_)`        → fatal decoder error
///
/// Error handling policy:
/// - `DecodeError` → skip bad frame (common with some codecs)
/// - `IoError`     → skip; end-of-stream is detected at the packet layer
/// - other errors  → fatal
pub fn decode_packet<'a>(
    decoder: &'a mut Box<dyn Decoder>,
    packet: &Packet,
) -> Result<Option<AudioBufferRef<'a>>> {
    match decoder.decode(packet) {
        Ok(buf) => Ok(Some(buf)),

        Err(SymphoniaError::DecodeError(e)) => {
            tracing::debug!(error = %e, "skipping undecodable packet");
            Ok(None)
        }

        Err(SymphoniaError::IoError(e)) => {
            tracing::debug!(error = %e, "IO error while decoding packet, skipping");
            Ok(None)
        }

        Err(e) => Err(Error::codec("decoder failure", e)),
    }
}
