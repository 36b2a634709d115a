//! Threaded audio pipeline tests
//!
//! Producers and consumers run on plain threads the way a device callback and
//! the session's send loop do, exercising the blocking buffer together with
//! the resampling and framing decorators.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use waav_realtime::core::audio::{
    AudioIo, AudioRead, AudioWrite, BlockingBuffer, FixedFrameReader, bytes_to_samples,
    samples_to_bytes,
};

/// Capture at 8kHz in irregular chunks, read 20ms service frames at 24kHz.
#[test]
fn test_capture_path_across_threads() {
    let io = AudioIo::new(24000, 8000, Duration::from_millis(20)).unwrap();
    let (_playback, mut capture) = io.endpoints().unwrap();
    let mut frames = io.capture_frames().unwrap();
    let frame_size = io.service_frame_size();
    assert_eq!(frame_size, 960);

    let consumer = thread::spawn(move || {
        let mut buf = vec![0u8; frame_size];
        let mut sizes = Vec::new();
        loop {
            let n = frames.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            assert!(bytes_to_samples(&buf[..n]).unwrap().iter().all(|&s| s == 1000));
            sizes.push(n);
        }
        sizes
    });

    // One second at 8kHz, chunk sizes a device might hand out
    let chunk_samples = [37usize, 160, 512, 3, 1024, 80];
    let mut remaining = 8000usize;
    let mut i = 0;
    while remaining > 0 {
        let n = chunk_samples[i % chunk_samples.len()].min(remaining);
        capture.write(&samples_to_bytes(&vec![1000i16; n])).unwrap();
        remaining -= n;
        i += 1;
    }
    io.close();

    let sizes = consumer.join().unwrap();
    assert_eq!(sizes.len(), 50);
    assert!(sizes.iter().all(|&n| n == frame_size));
}

/// Service-rate deltas in, device-rate frames out.
#[test]
fn test_playback_path_across_threads() {
    let io = AudioIo::new(24000, 8000, Duration::from_millis(20)).unwrap();
    let (mut playback, _capture) = io.endpoints().unwrap();
    let device_frame = io.device_frame_size();
    assert_eq!(device_frame, 320);

    let consumer = thread::spawn(move || {
        let mut buf = vec![0u8; device_frame];
        let mut total = 0;
        loop {
            let n = playback.read(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            total += n;
        }
        total
    });

    // 50 deltas of 20ms at 24kHz
    let delta = samples_to_bytes(&[-2500i16; 480]);
    for _ in 0..50 {
        io.write_playback(&delta).unwrap();
        thread::sleep(Duration::from_millis(1));
    }
    io.close();

    assert_eq!(consumer.join().unwrap(), 50 * device_frame);
}

/// A reset while the player is blocked drops queued audio but keeps the
/// stream open for the next response.
#[test]
fn test_barge_in_keeps_reader_alive() {
    let mut buffer = Arc::new(BlockingBuffer::new(1024));
    buffer.write(&[1u8; 512]).unwrap();
    buffer.reset();
    assert!(buffer.is_empty());

    let (tx, rx) = mpsc::channel();
    let reader = {
        let mut buffer = buffer.clone();
        thread::spawn(move || {
            let mut buf = [0u8; 64];
            let n = buffer.read(&mut buf).unwrap();
            tx.send(buf[..n].to_vec()).unwrap();
        })
    };

    thread::sleep(Duration::from_millis(30));
    buffer.reset();
    // Still waiting after the reset
    assert!(rx.recv_timeout(Duration::from_millis(30)).is_err());

    buffer.write(&[7u8; 16]).unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(2)).unwrap(), vec![7u8; 16]);
    reader.join().unwrap();
    assert_eq!(buffer.stats().reset_count, 2);
}

/// Closing releases a blocked reader only after buffered audio is drained.
#[test]
fn test_close_drains_then_ends() {
    let mut buffer = Arc::new(BlockingBuffer::new(1024));
    let mut frames = FixedFrameReader::new(buffer.clone(), 100).unwrap();

    let consumer = thread::spawn(move || {
        let mut buf = [0u8; 100];
        let mut reads = Vec::new();
        loop {
            let n = frames.read(&mut buf).unwrap();
            reads.push(n);
            if n == 0 {
                break;
            }
        }
        reads
    });

    buffer.write(&[0u8; 150]).unwrap();
    thread::sleep(Duration::from_millis(20));
    buffer.write(&[0u8; 100]).unwrap();
    buffer.close();
    assert!(buffer.write(&[0u8; 2]).is_err());

    // Two whole frames, the final partial one, then end-of-stream
    assert_eq!(consumer.join().unwrap(), vec![100, 100, 50, 0]);
}
