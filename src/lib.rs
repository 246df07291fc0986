//! `samplecue` — sample-accurate random access to audio tracks inside
//! container formats.
//!
//! This crate provides:
//! - A track indexer that records a content hash, timestamp, and sample
//!   offset for every decoded frame
//! - A seek-and-verify engine that guarantees `frame(n)` returns the correct
//!   payload even when the codec backend seeks imprecisely
//! - A byte-bounded frame cache and a small pool of reusable decoders
//! - A sample assembler for zero-padded, planar sample-range reads
//!
//! Container demuxing and codec decoding are delegated to a codec backend
//! (Symphonia by default, pluggable through [`backend::DecodeBackend`]). The
//! backend's seeking is treated as approximate: after every seek the decoder's
//! true position is re-established by matching decoded-frame hashes against
//! the index, with retries and a permanent linear-decoding fallback for
//! sources that refuse to cooperate.

// High-level API (most consumers should start here).
pub mod opts;
pub mod source;

// Codec backend contract and built-in implementations.
pub mod backend;
pub mod backends;

// Demux/decode helpers shared by the Symphonia backend.
pub mod decode;
pub mod demux;

// Frame payloads, properties, and the per-track index.
pub mod frame;
pub mod index;

// Frame cache and decoder pool.
pub mod cache;
pub mod pool;

// Sample assembly into caller-provided channel buffers.
mod assembler;

// Logging configuration and control.
pub mod logging;

pub mod error;

pub use error::{Error, Result};
