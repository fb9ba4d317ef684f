mod common;

use common::*;
use myy_engine::core::{PlaybackClock, SeekDirection, SeekRequest};
use myy_engine::player::{
    AudioControl, AudioPipeline, AudioSlot, DemuxQueues, DemuxShared, DemuxTiming, DemuxerThread,
    SeekCoordinator, SeekPhase, SeekState, StreamRouting, VideoDecodeOutcome, VideoPipeline,
    VideoSlot,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);

struct Session {
    queues: DemuxQueues,
    shared: Arc<DemuxShared>,
    seek: Arc<SeekState>,
    control: Arc<AudioControl>,
    clock: PlaybackClock,
    video: VideoSlot<MockVideoDecoder>,
    audio: AudioSlot<MockAudioDecoder>,
    video_flushes: Arc<Mutex<usize>>,
    seeks: Arc<Mutex<Vec<SeekRequest>>>,
    thread: DemuxerThread,
}

impl Session {
    fn start(source: MockSource) -> Self {
        let queues = DemuxQueues::new(256, true);
        let seek = Arc::new(SeekState::new());
        let shared = Arc::new(DemuxShared::new(
            seek.clone(),
            StreamRouting::new(VIDEO, Some(AUDIO)),
        ));
        let control = Arc::new(AudioControl::new(1.0));
        let clock = PlaybackClock::new();

        let decoder = MockVideoDecoder::default();
        let video_flushes = decoder.flushes.clone();
        let video = VideoSlot::new(VideoPipeline::new(decoder, queues.video.clone(), clock.clone()));
        let audio = AudioSlot::new(AudioPipeline::new(
            MockAudioDecoder::new(480, 48_000),
            queues.audio.clone().unwrap(),
            clock.clone(),
            48_000,
            192_000,
        ));

        let coordinator = SeekCoordinator::new(
            seek.clone(),
            video.flush_handle(),
            Some(audio.flush_handle()),
            queues.clone(),
            control.clone(),
        );
        let seeks = source.seeks.clone();
        let thread = DemuxerThread::start(
            Box::new(source),
            coordinator,
            queues.clone(),
            shared.clone(),
            DemuxTiming {
                backpressure_sleep: Duration::from_millis(1),
                eof_poll: Duration::from_millis(2),
            },
        )
        .unwrap();

        Self {
            queues,
            shared,
            seek,
            control,
            clock,
            video,
            audio,
            video_flushes,
            seeks,
            thread,
        }
    }

    fn wait_for_seek(&self, count: usize) {
        assert!(wait_until(TIMEOUT, || {
            self.seeks.lock().len() == count && self.seek.phase() == SeekPhase::Idle
        }));
    }
}

#[test]
fn successful_seek_restarts_reading_at_target() {
    let mut s = Session::start(MockSource::new(interleaved(50)));
    assert!(wait_until(TIMEOUT, || s.shared.is_eof()));
    assert_eq!(s.queues.video.len(), 50);

    s.seek.request(SeekRequest::from_seconds(1.0, SeekDirection::Forward));
    s.wait_for_seek(1);

    // 旧数据已被清空，队列从目标位置重新填充
    assert!(wait_until(TIMEOUT, || s.queues.video.len() == 25));
    assert!(wait_until(TIMEOUT, || s.shared.is_eof()));
    assert_eq!(*s.video_flushes.lock(), 1);
    match s.video.decode_frame(&s.seek) {
        VideoDecodeOutcome::Frame(frame) => assert_eq!(frame.pts, Some(1000)),
        other => panic!("expected frame, got {:?}", other),
    }
    assert!((s.clock.video() - 1.0).abs() < 1e-9);
    assert!(!s.control.is_suspended());
    s.thread.stop();
}

#[test]
fn decode_attempts_during_seek_report_no_data() {
    let source = MockSource::new(interleaved(50)).with_seek_delay(Duration::from_millis(150));
    let mut s = Session::start(source);
    assert!(wait_until(TIMEOUT, || s.shared.is_eof()));

    s.seek.request(SeekRequest::from_seconds(1.2, SeekDirection::Forward));
    assert!(wait_until(TIMEOUT, || s.seek.is_seeking()));

    let mut attempts = 0;
    let mut pcm = vec![0xAAu8; 256];
    loop {
        let outcome = s.video.decode_frame(&s.seek);
        let written = s.audio.render(&mut pcm, &s.control, &s.seek);
        if !s.seek.is_seeking() {
            break;
        }
        // 整个调用都落在 seek 窗口内
        assert!(matches!(outcome, VideoDecodeOutcome::NoData), "{:?}", outcome);
        assert_eq!(written, 0);
        assert!(pcm.iter().all(|b| *b == 0));
        pcm.fill(0xAA);
        attempts += 1;
    }
    assert!(attempts > 0);

    s.wait_for_seek(1);
    assert!(wait_until(TIMEOUT, || !s.queues.video.is_empty()));
    match s.video.decode_frame(&s.seek) {
        VideoDecodeOutcome::Frame(frame) => assert!(frame.pts.unwrap() >= 1200),
        other => panic!("expected frame, got {:?}", other),
    }
    s.thread.stop();
}

#[test]
fn failed_seek_leaves_queues_and_codecs_untouched() {
    let mut s = Session::start(MockSource::new(interleaved(20)).failing_seek());
    assert!(wait_until(TIMEOUT, || s.shared.is_eof()));

    s.seek.request(SeekRequest::from_seconds(0.4, SeekDirection::Backward));
    s.wait_for_seek(1);

    assert_eq!(s.queues.video.len(), 20);
    assert_eq!(s.queues.audio.as_ref().unwrap().len(), 20);
    assert_eq!(*s.video_flushes.lock(), 0);
    assert!(!s.control.is_suspended());
    assert!(!s.shared.has_failed());

    match s.video.decode_frame(&s.seek) {
        VideoDecodeOutcome::Frame(frame) => assert_eq!(frame.pts, Some(0)),
        other => panic!("expected frame, got {:?}", other),
    }
    s.thread.stop();
}

#[test]
fn seek_target_is_clamped_and_directional() {
    let mut s = Session::start(MockSource::new(interleaved(10)));
    s.seek.request(SeekRequest::from_seconds(-3.0, SeekDirection::Backward));
    s.wait_for_seek(1);

    let recorded = s.seeks.lock()[0];
    assert_eq!(recorded.target, 0);
    assert_eq!(recorded.direction, SeekDirection::Backward);
    s.thread.stop();
}
