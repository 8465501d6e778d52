use std::{sync::atomic::Ordering, time::Duration};

use super::fakes::{self, axis, frame_name, pattern, write_blocks, FakeProvider, FakeSource, DIMS};
use crate::{pipeline::NOTES_FILE, prefilter::average_hash, segments::VideoSegment};

const TIMEOUT: Duration = Duration::from_secs(10);

#[test]
fn test_failed_extraction_is_isolated() {
    let config = fakes::test_config();
    let mut source = FakeSource::new(3);
    source.failing.insert(1);
    let (handle, _) = FakeProvider::new().spawn(TIMEOUT);
    let segments = fakes::segments(3);

    let (doc, out) = fakes::run(&config, &source, handle, &segments);

    assert_eq!(doc.segments.len(), 3);
    let ids: Vec<usize> = doc.segments.iter().map(|s| s.segment_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);

    let counts: Vec<usize> = doc.segments.iter().map(|s| s.frame_count).collect();
    assert_eq!(counts, vec![3, 0, 3]);

    let failed = &doc.segments[1];
    assert!(failed.key_frames.is_empty());
    assert_eq!(failed.summary, "summary 2");
    assert_eq!(failed.start_time, "00:00:10.000");
    assert_eq!(failed.end_time, "00:00:20.000");
    assert_eq!(failed.duration_seconds, 10.0);

    assert_eq!(doc.statistics.total_frames, 6);
    assert_eq!(doc.statistics.segments_with_frames, 2);
    assert_eq!(doc.statistics.failed_segments, 1);

    for frame in doc.segments.iter().flat_map(|s| &s.key_frames) {
        assert!(out.path().join(frame).is_file(), "{frame} missing");
    }
}

#[test]
fn test_panicking_segment_is_contained() {
    let config = fakes::test_config();
    let mut source = FakeSource::new(2);
    source.panicking.insert(0);
    let (handle, _) = FakeProvider::new().spawn(TIMEOUT);

    let (doc, _out) = fakes::run(&config, &source, handle, &fakes::segments(3));

    let counts: Vec<usize> = doc.segments.iter().map(|s| s.frame_count).collect();
    assert_eq!(counts, vec![0, 2, 2]);
}

#[test]
fn test_order_survives_out_of_order_completion() {
    let mut config = fakes::test_config();
    config.max_concurrent_segments = 4;
    let mut source = FakeSource::new(1);
    for (segment, ms) in [(0, 120), (1, 90), (2, 60), (3, 30)] {
        source.delays.insert(segment, Duration::from_millis(ms));
    }
    let (handle, _) = FakeProvider::new().spawn(TIMEOUT);
    let segments = fakes::segments(6);

    let (doc, _out) = fakes::run(&config, &source, handle, &segments);

    let starts: Vec<&str> = doc.segments.iter().map(|s| s.start_time.as_str()).collect();
    let expected: Vec<&str> = segments.iter().map(|s| s.start_time.as_str()).collect();
    assert_eq!(starts, expected);
    assert_eq!(doc.video_info.processing_mode, "concurrent (workers=4)");
    assert!(source.max_active.load(Ordering::SeqCst) > 1);
}

#[test]
fn test_workers_capped_by_segment_count() {
    let mut config = fakes::test_config();
    config.max_concurrent_segments = 16;
    let source = FakeSource::new(1);
    let (handle, _) = FakeProvider::new().spawn(TIMEOUT);

    let (doc, _out) = fakes::run(&config, &source, handle, &fakes::segments(2));
    assert_eq!(doc.video_info.processing_mode, "concurrent (workers=2)");
}

#[test]
fn test_near_duplicate_embeddings_removed() {
    let mut config = fakes::test_config();
    config.enable_text_alignment = false;
    let source = FakeSource::new(5);

    let mut near = axis(0);
    near[1] = 0.05;
    let provider = FakeProvider::new()
        .with_vector(&frame_name(0, 0), axis(0))
        .with_vector(&frame_name(0, 1), axis(0))
        .with_vector(&frame_name(0, 2), axis(1))
        .with_vector(&frame_name(0, 3), axis(2))
        .with_vector(&frame_name(0, 4), near);
    let (handle, _) = provider.spawn(TIMEOUT);

    let (doc, out) = fakes::run(&config, &source, handle, &fakes::segments(1));

    let segment = &doc.segments[0];
    assert_eq!(segment.frame_count, 3);
    assert_eq!(
        segment.key_frames,
        vec![
            "frames/segment_001_00-00-00.000_to_00-00-10.000/unique_frame_000001.png",
            "frames/segment_001_00-00-00.000_to_00-00-10.000/unique_frame_000002.png",
            "frames/segment_001_00-00-00.000_to_00-00-10.000/unique_frame_000003.png",
        ]
    );

    // survivors are frames 0, 2 and 3, in that order
    let expected = source.frame_ids(0);
    let tmp = tempfile::tempdir().unwrap();
    for (saved, id) in segment.key_frames.iter().zip([expected[0], expected[2], expected[3]]) {
        let reference = tmp.path().join(format!("{id}.png"));
        write_blocks(&reference, pattern(id));
        assert_eq!(
            average_hash(&out.path().join(saved)).unwrap(),
            average_hash(&reference).unwrap()
        );
    }
}

#[test]
fn test_identical_frames_never_reach_provider() {
    let mut config = fakes::test_config();
    config.enable_text_alignment = false;
    let mut source = FakeSource::new(0);
    source.plan.insert(0, vec![7, 7, 7, 8, 8]);
    let (handle, stats) = FakeProvider::new().spawn(TIMEOUT);

    let (doc, _out) = fakes::run(&config, &source, handle, &fakes::segments(1));

    assert_eq!(stats.images_embedded.load(Ordering::SeqCst), 2);
    assert_eq!(doc.segments[0].frame_count, 2);
}

#[test]
fn test_provider_outage_degrades_to_positional() {
    let config = fakes::test_config();
    let source = FakeSource::new(5);
    let mut provider = FakeProvider::new();
    provider.fail_images = true;
    provider.fail_text = true;
    let (handle, stats) = provider.spawn(TIMEOUT);

    let (doc, _out) = fakes::run(&config, &source, handle, &fakes::segments(2));

    assert!(stats.image_calls.load(Ordering::SeqCst) >= 2);
    for segment in &doc.segments {
        assert_eq!(segment.frame_count, config.max_aligned_frames);
    }
}

#[test]
fn test_alignment_keeps_frames_closest_to_summary() {
    let mut config = fakes::test_config();
    config.max_aligned_frames = 2;
    let source = FakeSource::new(4);

    let mut text = vec![0.0; DIMS];
    text[1] = 0.2;
    text[3] = 1.0;
    let mut provider = FakeProvider::new();
    for n in 0..4 {
        provider = provider.with_vector(&frame_name(0, n), axis(n));
    }
    provider.text = text;
    let (handle, stats) = provider.spawn(TIMEOUT);

    let (doc, out) = fakes::run(&config, &source, handle, &fakes::segments(1));

    let segment = &doc.segments[0];
    assert_eq!(segment.frame_count, 2);
    assert_eq!(stats.text_calls.load(Ordering::SeqCst), 1);

    let ids = source.frame_ids(0);
    let tmp = tempfile::tempdir().unwrap();
    for (saved, id) in segment.key_frames.iter().zip([ids[3], ids[1]]) {
        let reference = tmp.path().join(format!("{id}.png"));
        write_blocks(&reference, pattern(id));
        assert_eq!(
            average_hash(&out.path().join(saved)).unwrap(),
            average_hash(&reference).unwrap()
        );
    }
}

#[test]
fn test_alignment_disabled_saves_every_kept_frame() {
    let mut config = fakes::test_config();
    config.enable_text_alignment = false;
    let source = FakeSource::new(6);
    let (handle, stats) = FakeProvider::new().spawn(TIMEOUT);

    let (doc, _out) = fakes::run(&config, &source, handle, &fakes::segments(1));

    assert_eq!(doc.segments[0].frame_count, 6);
    assert_eq!(stats.text_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_segments_with_equal_timecodes_keep_their_own_frames() {
    let mut config = fakes::test_config();
    config.enable_text_alignment = false;
    let source = FakeSource::new(2);
    let (handle, _) = FakeProvider::new().spawn(TIMEOUT);
    let segments = vec![
        VideoSegment::new("00:00:00.000", "00:00:10.000", "first take"),
        VideoSegment::new("00:00:00.000", "00:00:10.000", "second take"),
    ];

    let (doc, out) = fakes::run(&config, &source, handle, &segments);

    let first = &doc.segments[0].key_frames;
    let second = &doc.segments[1].key_frames;
    assert_eq!(first.len(), 2);
    assert_eq!(second.len(), 2);
    assert!(first.iter().all(|frame| !second.contains(frame)));

    let tmp = tempfile::tempdir().unwrap();
    for (index, segment) in doc.segments.iter().enumerate() {
        for (saved, id) in segment.key_frames.iter().zip(source.frame_ids(index)) {
            let reference = tmp.path().join(format!("{id}.png"));
            write_blocks(&reference, pattern(id));
            assert_eq!(
                average_hash(&out.path().join(saved)).unwrap(),
                average_hash(&reference).unwrap(),
                "{saved} holds another segment's frame"
            );
        }
    }
}

#[test]
fn test_bad_timecode_fails_only_its_segment() {
    let config = fakes::test_config();
    let source = FakeSource::new(2);
    let (handle, _) = FakeProvider::new().spawn(TIMEOUT);
    let mut segments = fakes::segments(3);
    segments[2] = VideoSegment::new("00:61:00", "00:62:00", "broken clock");

    let (doc, _out) = fakes::run(&config, &source, handle, &segments);

    let counts: Vec<usize> = doc.segments.iter().map(|s| s.frame_count).collect();
    assert_eq!(counts, vec![2, 2, 0]);
    assert_eq!(doc.segments[2].duration_seconds, 0.0);
    assert_eq!(doc.segments[2].summary, "broken clock");
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_document_written_with_relative_paths() {
    let config = fakes::test_config();
    let source = FakeSource::new(2);
    let (handle, _) = FakeProvider::new().spawn(TIMEOUT);

    let (doc, out) = fakes::run(&config, &source, handle, &fakes::segments(2));
    let path = doc.write_to(out.path()).unwrap();
    assert_eq!(path, out.path().join(NOTES_FILE));

    let value: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(value["video_info"]["total_segments"], 2);
    assert_eq!(value["statistics"]["total_frames"], 4);
    assert_eq!(value["video_info"]["source_video"], "lecture.mp4");

    for frame in value["segments"][1]["key_frames"].as_array().unwrap() {
        let rel = frame.as_str().unwrap();
        assert!(rel.starts_with("frames/segment_002_00-00-10.000_to_00-00-20.000/"));
        assert!(out.path().join(rel).is_file());
    }
}
