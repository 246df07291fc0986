use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Options that control how an audio source is opened and indexed.
///
/// This struct represents *library-level configuration*, not CLI flags directly.
/// Frontends (players, batch tools, tests) construct options programmatically so
/// the library stays reusable outside any particular host application.
#[derive(Debug, Clone)]
pub struct SourceOpts {
    /// Which track of the container to open.
    ///
    /// - `-1` selects the first audio track in the container.
    /// - `>= 0` picks the track at that container index; opening fails if the
    ///   index is out of range or the track is not decodable audio.
    pub track: i32,

    /// Whether mid-stream format changes are allowed.
    ///
    /// When `false`, decoded frames whose sample format, rate, or channel set
    /// differ from the first decoded frame are dropped, so the indexed track is
    /// guaranteed to be format-stable. Participates in index identity.
    pub variable_format: bool,

    /// Decoder thread count, `< 1` meaning "pick automatically".
    ///
    /// The built-in Symphonia backend decodes on the calling thread and records
    /// this knob without acting on it; backends with threaded decoders honor it.
    pub threads: i32,

    /// Optional base path for the on-disk track index.
    ///
    /// When `None`, the index is stored next to the source file. The final file
    /// name always incorporates the resolved track number, so multiple tracks
    /// of the same container never collide.
    pub index_path: Option<PathBuf>,

    /// Opaque options forwarded to the codec backend at open time.
    ///
    /// The map participates in index identity: a stored index built with a
    /// different option map is discarded and the track is re-indexed.
    pub backend_options: BTreeMap<String, String>,

    /// Dynamic-range-compression scale forwarded to the backend.
    ///
    /// Negative values are rejected at open. Participates in index identity.
    pub drc_scale: f64,

    /// Number of frames decoded before a seek target to warm up codec state.
    ///
    /// Clamped to `>= 0`. Adjustable after open via
    /// [`crate::source::AudioSource::set_seek_preroll`].
    pub seek_preroll: i64,

    /// Byte budget for the decoded-frame cache.
    pub max_cache_bytes: usize,

    /// Number of decoder slots kept alive for reuse.
    ///
    /// Clamped to `>= 1`.
    pub pool_capacity: usize,

    /// Cooperative cancellation token, checked between decoded frames during
    /// indexing. After cancellation the open fails with
    /// [`crate::Error::Cancelled`].
    pub cancel: Option<Arc<AtomicBool>>,
}

impl Default for SourceOpts {
    fn default() -> Self {
        Self {
            track: -1,
            variable_format: false,
            threads: 0,
            index_path: None,
            backend_options: BTreeMap::new(),
            drc_scale: 1.0,
            seek_preroll: 20,
            max_cache_bytes: 100 * 1024 * 1024,
            pool_capacity: 4,
            cancel: None,
        }
    }
}
