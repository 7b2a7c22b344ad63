//! End-to-end lifecycle scenarios through the classifier and controller.

use rtmp_relay::controller::{Outcome, StartOutcome, StreamState};
use rtmp_relay::events::classify;

use super::{controller, feed, CREATED, DESTROYED, PUBLISHING_AV, PUBLISHING_VIDEO};

#[tokio::test]
async fn created_then_publishing_starts_one_transcoder() {
    let controller = controller();
    feed(&controller, &[CREATED, PUBLISHING_AV]).await;

    assert_eq!(controller.supervisor().starts_for("live/cam1"), 1);
    let record = controller.record("live/cam1").unwrap();
    assert_eq!(record.video_codec, "H264");
    assert_eq!(record.audio_codec, "AAC");
    assert!(record.has_audio);
    assert_eq!(controller.state("live/cam1"), StreamState::ActiveTranscoding);
}

#[tokio::test]
async fn destroyed_stops_transcoder_and_removes_record() {
    let controller = controller();
    feed(&controller, &[CREATED, PUBLISHING_AV]).await;

    let outcome = controller.apply(classify(DESTROYED)).await;
    assert_eq!(
        outcome,
        Outcome::Closed {
            path: "live/cam1".to_string(),
            stopped: true
        }
    );

    let supervisor = controller.supervisor();
    assert_eq!(supervisor.stops_for("live/cam1"), 1);
    assert_eq!(supervisor.started()[0].0, supervisor.stopped()[0].0);
    assert!(controller.record("live/cam1").is_none());
    assert!(controller.transcoding_paths().is_empty());
    assert_eq!(controller.state("live/cam1"), StreamState::Unknown);
}

#[tokio::test]
async fn publishing_without_created_is_ignored() {
    let controller = controller();
    let outcome = controller
        .apply(classify(
            "cam2 is publishing to path 'live/cam2', 1 track (H264)",
        ))
        .await;

    assert_eq!(
        outcome,
        Outcome::UnknownStream {
            path: "live/cam2".to_string()
        }
    );
    assert!(controller.supervisor().started().is_empty());
    assert!(controller.record("live/cam2").is_none());
}

#[tokio::test]
async fn video_only_stream_still_transcodes() {
    let controller = controller();
    feed(&controller, &[CREATED, PUBLISHING_VIDEO]).await;

    let record = controller.record("live/cam1").unwrap();
    assert_eq!(record.video_codec, "H264");
    assert_eq!(record.audio_codec, "");
    assert!(!record.has_audio);
    assert_eq!(controller.supervisor().starts_for("live/cam1"), 1);
}

#[tokio::test]
async fn recreate_resets_codecs_but_keeps_transcoder() {
    let controller = controller();
    feed(&controller, &[CREATED, PUBLISHING_AV]).await;

    let outcome = controller.apply(classify(CREATED)).await;
    assert_eq!(
        outcome,
        Outcome::Opened {
            path: "live/cam1".to_string(),
            replaced: true
        }
    );

    let record = controller.record("live/cam1").unwrap();
    assert_eq!(record.video_codec, "");
    assert_eq!(record.audio_codec, "");
    assert!(!record.has_audio);

    assert!(controller.supervisor().stopped().is_empty());
    assert_eq!(controller.transcoding_paths(), vec!["live/cam1".to_string()]);
}

#[tokio::test]
async fn destroyed_for_unknown_path_is_a_no_op() {
    let controller = controller();
    let outcome = controller.apply(classify(DESTROYED)).await;

    assert_eq!(
        outcome,
        Outcome::UnknownStream {
            path: "live/cam1".to_string()
        }
    );
    assert!(controller.supervisor().stopped().is_empty());
}

#[tokio::test]
async fn destroyed_before_publishing_closes_without_stop() {
    let controller = controller();
    feed(&controller, &[CREATED]).await;

    let outcome = controller.apply(classify(DESTROYED)).await;
    assert_eq!(
        outcome,
        Outcome::Closed {
            path: "live/cam1".to_string(),
            stopped: false
        }
    );
    assert!(controller.supervisor().stopped().is_empty());
}

#[tokio::test]
async fn spawn_failure_leaves_stream_untranscoded() {
    let controller = controller();
    controller.supervisor().fail_start(true);
    feed(&controller, &[CREATED]).await;

    let outcome = controller.apply(classify(PUBLISHING_AV)).await;
    assert_eq!(
        outcome,
        Outcome::Detected {
            path: "live/cam1".to_string(),
            transcoder: StartOutcome::Failed
        }
    );
    assert_eq!(controller.state("live/cam1"), StreamState::ActiveNoCodec);
    assert_eq!(controller.record("live/cam1").unwrap().video_codec, "H264");
}

#[tokio::test]
async fn later_publishing_retries_after_spawn_failure() {
    let controller = controller();
    controller.supervisor().fail_start(true);
    feed(&controller, &[CREATED, PUBLISHING_AV]).await;
    assert!(controller.supervisor().started().is_empty());

    controller.supervisor().fail_start(false);
    let outcome = controller.apply(classify(PUBLISHING_AV)).await;
    assert_eq!(
        outcome,
        Outcome::Detected {
            path: "live/cam1".to_string(),
            transcoder: StartOutcome::Started
        }
    );
    assert_eq!(controller.supervisor().starts_for("live/cam1"), 1);
}

#[tokio::test]
async fn streams_are_independent() {
    let controller = controller();
    feed(
        &controller,
        &[
            "[path live/a] created",
            "[path live/b] created",
            "x is publishing to path 'live/a', 1 track (H264)",
            "y is publishing to path 'live/b', 2 tracks (H265, Opus)",
            "[path live/a] destroyed",
        ],
    )
    .await;

    assert_eq!(controller.active_paths(), vec!["live/b".to_string()]);
    assert_eq!(controller.transcoding_paths(), vec!["live/b".to_string()]);
    assert_eq!(controller.record("live/b").unwrap().audio_codec, "Opus");
}

#[tokio::test]
async fn shutdown_stops_all_transcoders() {
    let controller = controller();
    feed(
        &controller,
        &[
            "[path live/a] created",
            "[path live/b] created",
            "[path live/c] created",
            "x is publishing to path 'live/a', 1 track (H264)",
            "y is publishing to path 'live/b', 1 track (H264)",
        ],
    )
    .await;

    assert_eq!(controller.shutdown().await, 2);
    assert!(controller.active_paths().is_empty());
    assert!(controller.transcoding_paths().is_empty());
    assert_eq!(controller.supervisor().stopped().len(), 2);
}

#[tokio::test]
async fn start_transcoding_requires_a_record() {
    let controller = controller();

    assert_eq!(
        controller.start_transcoding("live/ghost").await,
        StartOutcome::Untracked
    );
    assert!(controller.supervisor().started().is_empty());
    assert!(controller.transcoding_paths().is_empty());

    feed(&controller, &[CREATED]).await;
    assert_eq!(
        controller.start_transcoding("live/cam1").await,
        StartOutcome::Started
    );
    assert_eq!(controller.state("live/cam1"), StreamState::ActiveTranscoding);
}
