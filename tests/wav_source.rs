//! End-to-end tests over a synthesized WAV file through the real Symphonia
//! backend: indexing, index persistence and reuse, and sample-accurate reads.

use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavSpec, WavWriter};
use samplecue::index::FrameInfo;
use samplecue::opts::SourceOpts;
use samplecue::source::AudioSource;

const SAMPLE_RATE: u32 = 48_000;
const NUM_SAMPLES: u32 = 2 * SAMPLE_RATE;
const CHANNELS: u32 = 2;

/// Deterministic full-range 16-bit test signal, distinct per channel.
fn reference_sample(i: u32, c: u32) -> i16 {
    (((i as i64 * 31 + c as i64 * 1709) % 65_536) - 32_768) as i16
}

fn reference_bytes(c: u32, start: u32, count: u32) -> Vec<u8> {
    (start..start + count)
        .flat_map(|i| reference_sample(i, c).to_le_bytes())
        .collect()
}

fn write_wav(dir: &Path) -> PathBuf {
    let path = dir.join("tone.wav");
    let spec = WavSpec {
        channels: CHANNELS as u16,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(&path, spec).expect("create wav");
    for i in 0..NUM_SAMPLES {
        for c in 0..CHANNELS {
            writer
                .write_sample(reference_sample(i, c))
                .expect("write sample");
        }
    }
    writer.finalize().expect("finalize wav");
    path
}

fn read_planar(source: &mut AudioSource, start: i64, count: i64) -> Vec<Vec<u8>> {
    let bytes = count as usize * 2;
    let mut left = vec![0u8; bytes];
    let mut right = vec![0u8; bytes];
    {
        let mut bufs: Vec<&mut [u8]> = vec![&mut left, &mut right];
        source
            .planar_audio(&mut bufs, start, count)
            .expect("planar_audio");
    }
    vec![left, right]
}

#[test]
fn indexing_a_wav_reports_progress_and_exact_properties() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path());

    let mut calls: Vec<(i32, i64, i64)> = Vec::new();
    let mut progress = |track: i32, current: i64, total: i64| calls.push((track, current, total));

    let source = AudioSource::open(&path, &SourceOpts::default(), Some(&mut progress)).unwrap();

    let props = source.audio_properties();
    assert!(!props.is_float);
    assert_eq!(props.bytes_per_sample, 2);
    assert_eq!(props.bits_per_sample, 16);
    assert_eq!(props.sample_rate, SAMPLE_RATE);
    assert_eq!(props.channels, CHANNELS);
    assert_eq!(props.num_samples, NUM_SAMPLES as i64);
    assert_eq!(props.num_frames, source.track_index().num_frames());

    // Index shape invariants.
    let frames = &source.track_index().frames;
    assert!(!frames.is_empty());
    assert_eq!(frames[0].start, 0);
    for pair in frames.windows(2) {
        assert!(pair[0].length > 0);
        assert_eq!(pair[1].start, pair[0].start + pair[0].length);
    }
    assert_eq!(source.track_index().num_samples(), NUM_SAMPLES as i64);

    // Per-frame progress plus the completion call.
    assert!(calls.len() > 1);
    let track = source.track();
    assert_eq!(*calls.last().unwrap(), (track, i64::MAX, i64::MAX));
}

#[test]
fn first_second_of_audio_matches_the_reference_signal() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path());

    let mut source = AudioSource::open(&path, &SourceOpts::default(), None).unwrap();
    let channels = read_planar(&mut source, 0, SAMPLE_RATE as i64);

    for (c, channel) in channels.iter().enumerate() {
        assert_eq!(channel, &reference_bytes(c as u32, 0, SAMPLE_RATE));
    }
}

#[test]
fn zero_padding_applies_outside_the_track() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path());

    let mut source = AudioSource::open(&path, &SourceOpts::default(), None).unwrap();

    for channel in read_planar(&mut source, -256, 256) {
        assert!(channel.iter().all(|&b| b == 0));
    }
    for channel in read_planar(&mut source, NUM_SAMPLES as i64, 256) {
        assert!(channel.iter().all(|&b| b == 0));
    }

    // Straddling the end: valid tail then zeros.
    let channels = read_planar(&mut source, NUM_SAMPLES as i64 - 16, 32);
    for (c, channel) in channels.iter().enumerate() {
        assert_eq!(
            &channel[..32],
            &reference_bytes(c as u32, NUM_SAMPLES - 16, 16)[..]
        );
        assert!(channel[32..].iter().all(|&b| b == 0));
    }
}

#[test]
fn frames_match_their_index_entries_on_both_paths() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path());

    let mut source = AudioSource::open(&path, &SourceOpts::default(), None).unwrap();
    let num_frames = source.audio_properties().num_frames;

    for n in [0, num_frames / 2, num_frames - 1] {
        let expected = source.track_index().frames[n as usize].hash;

        let seeked = source.frame(n).unwrap().expect("frame via seek path");
        assert_eq!(seeked.content_hash(), expected, "frame {n}");

        let linear = source.frame_linear(n).unwrap().expect("frame via linear path");
        assert_eq!(linear.content_hash(), expected, "frame {n}");
    }

    assert!(source.frame(num_frames).unwrap().is_none());
    assert!(source.frame(-1).unwrap().is_none());
}

#[test]
fn stored_index_is_reused_on_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path());

    let first_frames: Vec<FrameInfo>;
    let track;
    {
        let mut count = 0usize;
        let mut progress = |_: i32, _: i64, _: i64| count += 1;
        let source = AudioSource::open(&path, &SourceOpts::default(), Some(&mut progress)).unwrap();
        first_frames = source.track_index().frames.clone();
        track = source.track();
        assert!(count > 0);
    }

    let index_file = dir.path().join(format!("tone.wav.{track}.scidx"));
    assert!(index_file.exists());

    let mut count = 0usize;
    let mut progress = |_: i32, _: i64, _: i64| count += 1;
    let source = AudioSource::open(&path, &SourceOpts::default(), Some(&mut progress)).unwrap();

    // No re-index happened, and the loaded index matches the built one.
    assert_eq!(count, 0);
    assert_eq!(source.track_index().frames, first_frames);
}

#[test]
fn changed_backend_options_invalidate_the_stored_index() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path());

    AudioSource::open(&path, &SourceOpts::default(), None).unwrap();

    let mut opts = SourceOpts::default();
    opts.backend_options
        .insert("enable_gapless".to_string(), "true".to_string());

    let mut count = 0usize;
    let mut progress = |_: i32, _: i64, _: i64| count += 1;
    AudioSource::open(&path, &opts, Some(&mut progress)).unwrap();

    assert!(count > 0, "a different option map must force a re-index");
}

#[test]
fn explicit_index_path_overrides_the_default_location() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path());
    let index_dir = tempfile::tempdir().unwrap();

    let mut opts = SourceOpts::default();
    opts.index_path = Some(index_dir.path().join("cached"));

    let source = AudioSource::open(&path, &opts, None).unwrap();
    let track = source.track();

    assert!(index_dir.path().join(format!("cached.{track}.scidx")).exists());
    assert!(!dir.path().join(format!("tone.wav.{track}.scidx")).exists());
}

#[test]
fn negative_drc_scale_is_rejected_at_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path());

    let mut opts = SourceOpts::default();
    opts.drc_scale = -1.0;

    assert!(matches!(
        AudioSource::open(&path, &opts, None),
        Err(samplecue::Error::InvalidArgument { .. })
    ));
}

#[test]
fn invalid_track_requests_fail_to_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_wav(dir.path());

    let mut opts = SourceOpts::default();
    opts.track = 7;

    assert!(matches!(
        AudioSource::open(&path, &opts, None),
        Err(samplecue::Error::Open { .. })
    ));
}
