//! Spawning, killing and reaping real processes.
//!
//! `sleep` stands in for ffmpeg: it runs until signalled.

#![cfg(unix)]

use std::time::Duration;

use rtmp_relay::config::TranscoderConfig;
use rtmp_relay::controller::{Outcome, StartOutcome, StreamController};
use rtmp_relay::events::classify;
use rtmp_relay::transcoder::{
    FfmpegSupervisor, ProcessSupervisor, SpawnError, StopSignal, TranscoderHandle,
    TranscoderProcess,
};
use tokio_test::assert_ok;

fn sleep_process() -> TranscoderProcess {
    TranscoderProcess::spawn_with_args("sleep", &["30".to_string()]).unwrap()
}

#[tokio::test]
async fn spawn_and_wait_for_exit() {
    let mut process = TranscoderProcess::spawn_with_args("true", &[]).unwrap();
    assert!(process.id().is_some());

    let status = process.wait().await.unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn try_wait_on_running_process() {
    let mut process = sleep_process();
    assert!(process.try_wait().unwrap().is_none());

    FfmpegSupervisor::stop_process(&mut process, StopSignal::Kill)
        .await
        .unwrap();
}

#[tokio::test]
async fn kill_stops_and_reaps() {
    let mut process = sleep_process();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        FfmpegSupervisor::stop_process(&mut process, StopSignal::Kill),
    )
    .await
    .unwrap();
    assert_ok!(result);

    // Reaped: no pid, and the cached status is non-success.
    assert!(process.id().is_none());
    assert!(!process.wait().await.unwrap().success());
}

#[tokio::test]
async fn term_stops_and_reaps() {
    let mut process = sleep_process();

    let result = tokio::time::timeout(
        Duration::from_secs(5),
        FfmpegSupervisor::stop_process(&mut process, StopSignal::Term),
    )
    .await
    .unwrap();
    assert_ok!(result);
    assert!(process.id().is_none());
}

#[tokio::test]
async fn stopping_an_exited_process_still_reaps() {
    let mut process = TranscoderProcess::spawn_with_args("true", &[]).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let _ = FfmpegSupervisor::stop_process(&mut process, StopSignal::Kill).await;
    assert!(process.id().is_none());
}

#[tokio::test]
async fn supervisor_stop_consumes_handle() {
    let supervisor = FfmpegSupervisor::default();
    let handle = TranscoderHandle::new("live/cam1", sleep_process());
    assert_eq!(handle.path(), "live/cam1");
    assert!(handle.pid().is_some());

    assert_ok!(supervisor.stop(handle).await);
}

#[tokio::test]
async fn controller_with_missing_binary_records_failure() {
    let supervisor = FfmpegSupervisor::new(TranscoderConfig {
        binary: "/nonexistent/ffmpeg-12345".to_string(),
        ..Default::default()
    });
    assert!(matches!(
        supervisor.start("live/cam1").await,
        Err(SpawnError::NotFound(_))
    ));

    let controller = StreamController::new(supervisor);
    controller.apply(classify("[path live/cam1] created")).await;
    let outcome = controller
        .apply(classify(
            "cam1 is publishing to path 'live/cam1', 1 track (H264)",
        ))
        .await;

    assert_eq!(
        outcome,
        Outcome::Detected {
            path: "live/cam1".to_string(),
            transcoder: StartOutcome::Failed
        }
    );
    assert!(controller.transcoding_paths().is_empty());
}

#[tokio::test]
async fn controller_runs_real_process_lifecycle() {
    // Accepts ffmpeg's arguments and runs until killed.
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("fake-ffmpeg");
    std::fs::write(&script, "#!/bin/sh\nexec sleep 30\n").unwrap();
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    let controller = StreamController::new(FfmpegSupervisor::new(TranscoderConfig {
        binary: script.to_string_lossy().into_owned(),
        ..Default::default()
    }));

    controller.apply(classify("[path live/cam1] created")).await;
    controller
        .apply(classify(
            "cam1 is publishing to path 'live/cam1', 2 tracks (H264, AAC)",
        ))
        .await;
    assert_eq!(controller.transcoding_paths(), vec!["live/cam1".to_string()]);

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        controller.apply(classify("[path live/cam1] destroyed")),
    )
    .await
    .unwrap();
    assert_eq!(
        outcome,
        Outcome::Closed {
            path: "live/cam1".to_string(),
            stopped: true
        }
    );
    assert!(controller.transcoding_paths().is_empty());
}
