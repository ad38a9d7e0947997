//! End-to-end recording tests against a real child process.
//!
//! A small shell script stands in for the encoder: it copies its stdin into
//! the output path (its last argument), which lets the tests check exactly
//! which bytes reached the encoder.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use vision_stream::camera::{Frame, FrameShape};
use vision_stream::pipeline::{EncoderSettings, PipelineError};
use vision_stream::recording::{
    Action, Recorder, RecordingError, RecordingSettings, RecordingState,
};

const COPY_ENCODER: &str = "#!/bin/sh\nfor last; do :; done\ncat > \"$last\"\n";
const STUCK_ENCODER: &str = "#!/bin/sh\nexec sleep 30\n";
const FAILING_ENCODER: &str = "#!/bin/sh\necho 'cannot open output' >&2\nexit 1\n";

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn recorder_with(dir: &Path, program: &Path) -> Recorder {
    Recorder::new(RecordingSettings {
        dir: dir.join("recordings"),
        history_capacity: 10,
        writer_poll_ms: 50,
        join_timeout_secs: 2,
        exit_timeout_secs: 1,
        encoder: EncoderSettings {
            program: program.to_string_lossy().into_owned(),
            ..Default::default()
        },
        ..Default::default()
    })
}

fn shape() -> FrameShape {
    FrameShape {
        height: 2,
        width: 3,
        channels: 3,
    }
}

fn frame(tag: u8) -> Frame {
    Frame::from_rgb(3, 2, vec![tag; 18]).unwrap()
}

#[test]
fn test_recording_writes_every_frame_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    let encoder = write_script(tmp.path(), "encoder.sh", COPY_ENCODER);
    let recorder = recorder_with(tmp.path(), &encoder);

    let path = recorder.start(shape(), 30.0).unwrap();
    assert_eq!(recorder.state(), RecordingState::Recording);
    let filename = path.file_name().unwrap().to_str().unwrap().to_string();
    assert!(filename.starts_with("stream-"));
    assert!(filename.ends_with(".mp4"));

    for i in 0..20 {
        assert!(recorder.enqueue(frame(i)));
    }
    let report = recorder.stop().unwrap();

    assert_eq!(recorder.state(), RecordingState::Idle);
    assert_eq!(report.frames_queued, 20);
    assert_eq!(report.frames_written, 20);
    assert_eq!(report.frames_dropped, 0);
    assert!(!report.writer_abandoned);
    assert!(!report.encoder_killed);
    assert_eq!(report.filename, filename);

    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 20 * 18);
    assert!(bytes[..18].iter().all(|&b| b == 0));
    assert!(bytes[19 * 18..].iter().all(|&b| b == 19));

    let history = recorder.history().snapshot();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].action, Action::Started);
    assert_eq!(history[1].action, Action::Stopped);
    assert_eq!(history[0].path, filename);
    assert_eq!(history[1].path, filename);
    assert!(history[1].duration.is_some());
}

#[test]
fn test_back_to_back_sessions_keep_separate_files() {
    let tmp = tempfile::tempdir().unwrap();
    let encoder = write_script(tmp.path(), "encoder.sh", COPY_ENCODER);
    let recorder = recorder_with(tmp.path(), &encoder);

    let first = recorder.start(shape(), 30.0).unwrap();
    assert!(recorder.enqueue(frame(1)));
    recorder.stop().unwrap();
    assert_eq!(std::fs::read(&first).unwrap().len(), 18);

    let second = recorder.start(shape(), 30.0).unwrap();
    recorder.stop().unwrap();

    assert_ne!(first, second);
    assert_eq!(std::fs::read(&first).unwrap().len(), 18);
    assert_eq!(std::fs::read(&second).unwrap().len(), 0);

    let history = recorder.history().snapshot();
    assert_eq!(history.len(), 4);
    assert_ne!(history[0].path, history[2].path);
}

#[test]
fn test_duration_tracks_wall_clock() {
    let tmp = tempfile::tempdir().unwrap();
    let encoder = write_script(tmp.path(), "encoder.sh", COPY_ENCODER);
    let recorder = recorder_with(tmp.path(), &encoder);

    let before = Instant::now();
    recorder.start(shape(), 30.0).unwrap();
    thread::sleep(Duration::from_millis(400));
    let report = recorder.stop().unwrap();
    let elapsed = before.elapsed();

    assert!(report.duration >= Duration::from_millis(400));
    assert!(report.duration <= elapsed);

    let history = recorder.history().snapshot();
    let recorded = history[1].duration.unwrap();
    assert_eq!(recorded, report.duration);
}

#[test]
fn test_start_twice_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let encoder = write_script(tmp.path(), "encoder.sh", COPY_ENCODER);
    let recorder = recorder_with(tmp.path(), &encoder);

    recorder.start(shape(), 25.0).unwrap();
    assert!(matches!(
        recorder.start(shape(), 25.0),
        Err(RecordingError::AlreadyRecording)
    ));
    assert_eq!(recorder.history().len(), 1);

    recorder.stop().unwrap();
    assert!(matches!(recorder.stop(), Err(RecordingError::NotRecording)));
    assert_eq!(recorder.history().len(), 2);
}

#[test]
fn test_concurrent_starts_yield_one_session() {
    let tmp = tempfile::tempdir().unwrap();
    let encoder = write_script(tmp.path(), "encoder.sh", COPY_ENCODER);
    let recorder = Arc::new(recorder_with(tmp.path(), &encoder));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let recorder = Arc::clone(&recorder);
            thread::spawn(move || recorder.start(shape(), 30.0).is_ok())
        })
        .collect();
    let started = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();

    assert_eq!(started, 1);
    assert_eq!(recorder.history().len(), 1);
    recorder.stop().unwrap();
}

#[test]
fn test_stuck_encoder_is_killed_after_timeout() {
    let tmp = tempfile::tempdir().unwrap();
    let encoder = write_script(tmp.path(), "stuck.sh", STUCK_ENCODER);
    let recorder = recorder_with(tmp.path(), &encoder);

    recorder.start(shape(), 30.0).unwrap();
    for i in 0..5 {
        recorder.enqueue(frame(i));
    }

    let started = Instant::now();
    let report = recorder.stop().unwrap();
    assert!(report.encoder_killed);
    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(recorder.state(), RecordingState::Idle);
    assert_eq!(recorder.history().len(), 2);
}

#[test]
fn test_writer_failure_keeps_session_until_stop() {
    let tmp = tempfile::tempdir().unwrap();
    let encoder = write_script(tmp.path(), "failing.sh", FAILING_ENCODER);
    let recorder = recorder_with(tmp.path(), &encoder);

    recorder.start(shape(), 30.0).unwrap();

    // Once the encoder is gone the writer fails and frames stop being accepted
    let started = Instant::now();
    let mut accepted = true;
    while accepted && started.elapsed() < Duration::from_secs(5) {
        accepted = recorder.enqueue(frame(1));
        thread::sleep(Duration::from_millis(10));
    }
    assert!(!accepted);
    assert!(recorder.is_recording());

    let report = recorder.stop().unwrap();
    assert!(!report.encoder_killed);
    assert!(report.frames_dropped >= 1);
    assert_eq!(recorder.state(), RecordingState::Idle);

    let history = recorder.history().snapshot();
    assert_eq!(history.last().unwrap().action, Action::Stopped);
}

#[test]
fn test_missing_encoder_leaves_recorder_idle() {
    let tmp = tempfile::tempdir().unwrap();
    let recorder = recorder_with(tmp.path(), Path::new("/nonexistent/encoder"));

    let result = recorder.start(shape(), 30.0);
    assert!(matches!(
        result,
        Err(RecordingError::EncoderLaunch(PipelineError::NotFound(_)))
    ));
    assert_eq!(recorder.state(), RecordingState::Idle);
    assert!(recorder.history().is_empty());
    assert!(!recorder.enqueue(frame(0)));
}

#[test]
fn test_mismatched_frames_are_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let encoder = write_script(tmp.path(), "encoder.sh", COPY_ENCODER);
    let recorder = recorder_with(tmp.path(), &encoder);

    let path = recorder.start(shape(), 30.0).unwrap();
    assert!(recorder.enqueue(frame(1)));
    assert!(!recorder.enqueue(Frame::from_rgb(1, 1, vec![9, 9, 9]).unwrap()));
    let report = recorder.stop().unwrap();

    assert_eq!(report.frames_written, 1);
    assert_eq!(std::fs::read(&path).unwrap().len(), 18);
}

#[test]
fn test_full_queue_drops_oldest_frames() {
    let tmp = tempfile::tempdir().unwrap();
    let encoder = write_script(tmp.path(), "stuck.sh", STUCK_ENCODER);
    let recorder = Recorder::new(RecordingSettings {
        dir: tmp.path().join("recordings"),
        queue_capacity: 4,
        writer_poll_ms: 50,
        join_timeout_secs: 1,
        exit_timeout_secs: 1,
        encoder: EncoderSettings {
            program: encoder.to_string_lossy().into_owned(),
            ..Default::default()
        },
        ..Default::default()
    });

    recorder.start(shape(), 30.0).unwrap();
    // Large enough to fill the pipe to a non-reading encoder
    for i in 0..10_000u32 {
        recorder.enqueue(frame((i % 251) as u8));
    }
    assert!(recorder.queue_depth().unwrap() <= 4);

    let report = recorder.stop().unwrap();
    assert!(report.frames_dropped > 0);
    assert_eq!(recorder.state(), RecordingState::Idle);
}
