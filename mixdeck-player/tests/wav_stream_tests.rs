//! WavStream against files written by hound and opened through FsStorage

mod helpers;

use helpers::*;
use hound::{SampleFormat, WavSpec};
use mixdeck_player::audio::storage::{FsStorage, MediaSource, Storage};
use mixdeck_player::audio::wav::WavStream;
use mixdeck_player::{Error, Result};
use std::path::Path;
use tempfile::TempDir;

fn open(storage: &FsStorage, name: &str) -> Result<WavStream<Box<dyn MediaSource>>> {
    WavStream::open(storage.open(Path::new(name))?)
}

fn read_all<R: std::io::Read + std::io::Seek>(stream: &mut WavStream<R>, block: usize) -> Vec<i16> {
    let mut out = Vec::new();
    let mut buffer = vec![0i16; block];
    loop {
        let n = stream.read(&mut buffer, block).unwrap();
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buffer[..n]);
    }
}

#[test]
fn test_stereo_file_reads_back_interleaved() {
    let dir = TempDir::new().unwrap();
    let samples: Vec<i16> = (0..2000).map(|i| (i * 7 - 7000) as i16).collect();
    write_wav(dir.path().join("stereo.wav"), 2, &samples).unwrap();

    let storage = FsStorage::new(dir.path());
    let mut stream = open(&storage, "stereo.wav").unwrap();

    assert_eq!(stream.sample_rate(), TEST_SAMPLE_RATE);
    assert_eq!(stream.channels(), 2);
    assert_eq!(stream.total_samples(), 2000);
    assert_eq!(stream.duration().as_millis(), 125);

    // Block size that does not divide the length
    assert_eq!(read_all(&mut stream, 333), samples);
    assert_eq!(stream.remaining_samples(), 0);
}

#[test]
fn test_reset_to_start_replays_from_first_sample() {
    let dir = TempDir::new().unwrap();
    let samples = ramp(100);
    write_wav(dir.path().join("mono.wav"), 1, &samples).unwrap();

    let storage = FsStorage::new(dir.path());
    let mut stream = open(&storage, "mono.wav").unwrap();

    let mut buffer = [0i16; 64];
    assert_eq!(stream.read(&mut buffer, 64).unwrap(), 64);
    stream.reset_to_start().unwrap();
    assert_eq!(stream.position(), 0);
    assert_eq!(read_all(&mut stream, 64), samples);
}

#[test]
fn test_max_samples_limits_read() {
    let dir = TempDir::new().unwrap();
    write_wav(dir.path().join("mono.wav"), 1, &ramp(10)).unwrap();

    let storage = FsStorage::new(dir.path());
    let mut stream = open(&storage, "mono.wav").unwrap();

    let mut buffer = [0i16; 8];
    assert_eq!(stream.read(&mut buffer, 3).unwrap(), 3);
    assert_eq!(&buffer[..3], &[1, 2, 3]);
    assert_eq!(buffer[3], 0);
}

#[test]
fn test_non_16_bit_files_rejected() {
    let dir = TempDir::new().unwrap();
    let specs = [
        ("u8.wav", 8, SampleFormat::Int),
        ("i24.wav", 24, SampleFormat::Int),
        ("f32.wav", 32, SampleFormat::Float),
    ];
    for (name, bits, format) in specs {
        let spec = WavSpec {
            channels: 1,
            sample_rate: TEST_SAMPLE_RATE,
            bits_per_sample: bits,
            sample_format: format,
        };
        write_wav_with_spec(dir.path().join(name), spec, 16).unwrap();
    }

    let storage = FsStorage::new(dir.path());
    for name in ["u8.wav", "i24.wav", "f32.wav"] {
        assert!(
            matches!(open(&storage, name), Err(Error::InvalidHeader { .. })),
            "{} should be rejected",
            name
        );
    }
}

#[test]
fn test_four_channel_file_opens() {
    let dir = TempDir::new().unwrap();
    let samples = ramp(64);
    write_wav(dir.path().join("quad.wav"), 4, &samples).unwrap();

    let storage = FsStorage::new(dir.path());
    let mut stream = open(&storage, "quad.wav").unwrap();
    assert_eq!(stream.channels(), 4);
    assert_eq!(read_all(&mut stream, 16), samples);
}

#[test]
fn test_truncated_file_clamped_to_available_data() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("cut.wav");
    let samples = ramp(500);
    write_wav(&path, 1, &samples).unwrap();

    // Drop the last 10 samples without fixing the header
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    let len = file.metadata().unwrap().len();
    file.set_len(len - 20).unwrap();
    drop(file);

    let storage = FsStorage::new(dir.path());
    let mut stream = open(&storage, "cut.wav").unwrap();
    assert_eq!(stream.total_samples(), 490);
    assert_eq!(read_all(&mut stream, 128), samples[..490].to_vec());
}

#[test]
fn test_missing_file_is_not_found() {
    let dir = TempDir::new().unwrap();
    let storage = FsStorage::new(dir.path());
    assert!(matches!(open(&storage, "absent.wav"), Err(Error::NotFound { .. })));
}

#[test]
fn test_not_a_wav_file_rejected() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.wav"), b"just some text, not audio at all").unwrap();

    let storage = FsStorage::new(dir.path());
    assert!(matches!(open(&storage, "notes.wav"), Err(Error::InvalidHeader { .. })));
}
