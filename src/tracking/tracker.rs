//! Tracking coordinator
//!
//! `Tracker` owns the pluggable capture/detector/sender dependencies, runs
//! the per-frame loop on a fixed-rate timer, and fans results out to any
//! number of subscribers without ever blocking on a slow consumer.
//!
//! Lifecycle: `Idle -> Running -> Stopped -> Closed`, with `Closed`
//! absorbing. All public methods may be called concurrently; `stop()` and
//! `close()` return only after the frame loop has fully exited, so no
//! further sends or fan-outs happen once they return.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{Result, TrackerError};

use super::smoothing::LandmarkSmoother;
use super::{CameraSource, Processor, Sender, TrackerState, TrackingData};

/// Per-subscriber channel capacity. When a subscriber's buffer is full it
/// silently misses frames instead of stalling the pipeline.
const SUBSCRIBER_BUFFER: usize = 10;

type SubscriberList = Arc<Mutex<Vec<mpsc::Sender<Arc<TrackingData>>>>>;

/// Main coordinator for face/hand/pose tracking.
pub struct Tracker {
    cfg: Config,
    smoothers: Arc<Smoothers>,
    subscribers: SubscriberList,
    inner: Mutex<Inner>,
}

struct Inner {
    state: TrackerState,
    camera: Option<Arc<dyn CameraSource>>,
    processor: Option<Arc<dyn Processor>>,
    vmc_sender: Option<Arc<dyn Sender>>,
    osc_sender: Option<Arc<dyn Sender>>,
    cancel: Option<CancellationToken>,
    /// Cancelled by the loop task itself (via a drop guard) once it has
    /// fully exited. `stop()` and `close()` can both await it, so a
    /// concurrent pair still each observe loop completion.
    loop_done: Option<CancellationToken>,
}

/// One persistent smoother per tracked channel. Filter state survives
/// stop/start cycles; jitter suppression picks up where it left off.
struct Smoothers {
    face: LandmarkSmoother,
    left_hand: LandmarkSmoother,
    right_hand: LandmarkSmoother,
    pose: LandmarkSmoother,
}

impl Tracker {
    /// Create a tracker with the given configuration.
    pub fn new(cfg: Config) -> Result<Self> {
        cfg.validate()?;

        let factor = cfg.tracking.smoothing_factor;
        Ok(Self {
            cfg,
            smoothers: Arc::new(Smoothers {
                face: LandmarkSmoother::new(factor),
                left_hand: LandmarkSmoother::new(factor),
                right_hand: LandmarkSmoother::new(factor),
                pose: LandmarkSmoother::new(factor),
            }),
            subscribers: Arc::new(Mutex::new(Vec::new())),
            inner: Mutex::new(Inner {
                state: TrackerState::Idle,
                camera: None,
                processor: None,
                vmc_sender: None,
                osc_sender: None,
                cancel: None,
                loop_done: None,
            }),
        })
    }

    /// The current configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// The current lifecycle state.
    pub async fn state(&self) -> TrackerState {
        self.inner.lock().await.state
    }

    /// Set the camera capture backend. Legal only before `start()`.
    pub async fn set_camera_source<C>(&self, camera: C) -> Result<()>
    where
        C: CameraSource + 'static,
    {
        let mut inner = self.inner.lock().await;
        inner.check_idle("set camera source")?;
        inner.camera = Some(Arc::new(camera));
        Ok(())
    }

    /// Set the landmark detection backend. Legal only before `start()`.
    pub async fn set_processor<P>(&self, processor: P) -> Result<()>
    where
        P: Processor + 'static,
    {
        let mut inner = self.inner.lock().await;
        inner.check_idle("set processor")?;
        inner.processor = Some(Arc::new(processor));
        Ok(())
    }

    /// Set the VMC protocol sender. Legal only before `start()`.
    pub async fn set_vmc_sender<S>(&self, sender: S) -> Result<()>
    where
        S: Sender + 'static,
    {
        let mut inner = self.inner.lock().await;
        inner.check_idle("set VMC sender")?;
        inner.vmc_sender = Some(Arc::new(sender));
        Ok(())
    }

    /// Set the raw OSC protocol sender. Legal only before `start()`.
    pub async fn set_osc_sender<S>(&self, sender: S) -> Result<()>
    where
        S: Sender + 'static,
    {
        let mut inner = self.inner.lock().await;
        inner.check_idle("set OSC sender")?;
        inner.osc_sender = Some(Arc::new(sender));
        Ok(())
    }

    /// Subscribe to tracking data. May be called in any state.
    ///
    /// Delivery is best-effort: a subscriber that stops draining its channel
    /// misses frames but never stalls the pipeline or other subscribers. All
    /// subscriber channels close together when the tracker is closed.
    pub async fn subscribe(&self) -> mpsc::Receiver<Arc<TrackingData>> {
        let inner = self.inner.lock().await;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        if inner.state != TrackerState::Closed {
            self.subscribers.lock().await.push(tx);
        }
        // After close the sender is dropped immediately, handing the caller
        // an already-closed channel.
        rx
    }

    /// Begin the tracking loop. Returns immediately; capture and processing
    /// run on a background task.
    pub async fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            TrackerState::Running => return Err(TrackerError::AlreadyRunning.into()),
            TrackerState::Closed => return Err(TrackerError::AlreadyClosed.into()),
            _ => {}
        }

        let cancel = CancellationToken::new();
        let frame_loop = FrameLoop {
            period: Duration::from_secs_f64(1.0 / f64::from(self.cfg.camera.fps)),
            enable_face: self.cfg.tracking.enable_face,
            enable_hands: self.cfg.tracking.enable_hands,
            enable_pose: self.cfg.tracking.enable_pose,
            camera: inner.camera.clone(),
            processor: inner.processor.clone(),
            vmc_sender: inner.vmc_sender.clone(),
            osc_sender: inner.osc_sender.clone(),
            smoothers: Arc::clone(&self.smoothers),
            subscribers: Arc::clone(&self.subscribers),
            cancel: cancel.clone(),
        };

        let done = CancellationToken::new();
        inner.state = TrackerState::Running;
        inner.cancel = Some(cancel);
        inner.loop_done = Some(done.clone());
        tokio::spawn(async move {
            // Fires even if the loop panics
            let _complete = done.drop_guard();
            frame_loop.run().await;
        });

        info!("Tracker started ({} fps)", self.cfg.camera.fps);
        Ok(())
    }

    /// Stop the tracking loop. Returns once the loop task has fully exited:
    /// no sends or fan-outs happen after this returns.
    pub async fn stop(&self) -> Result<()> {
        let (cancel, done) = {
            let mut inner = self.inner.lock().await;
            match inner.state {
                TrackerState::Running => {}
                TrackerState::Closed => return Err(TrackerError::AlreadyClosed.into()),
                _ => return Err(TrackerError::NotRunning.into()),
            }
            inner.state = TrackerState::Stopped;
            // Cloned, not taken: a concurrent close() must still find the
            // completion token and wait for the loop itself
            (inner.cancel.clone(), inner.loop_done.clone())
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        if let Some(done) = done {
            done.cancelled().await;
        }

        info!("Tracker stopped");
        Ok(())
    }

    /// Stop tracking and release all resources. Tears down every registered
    /// dependency, collecting (not short-circuiting on) individual errors,
    /// and closes all subscriber channels. The tracker cannot be reused.
    pub async fn close(&self) -> Result<()> {
        let (cancel, done, camera, processor, vmc_sender, osc_sender) = {
            let mut inner = self.inner.lock().await;
            if inner.state == TrackerState::Closed {
                return Err(TrackerError::AlreadyClosed.into());
            }
            inner.state = TrackerState::Closed;
            (
                inner.cancel.clone(),
                inner.loop_done.clone(),
                inner.camera.take(),
                inner.processor.take(),
                inner.vmc_sender.take(),
                inner.osc_sender.take(),
            )
        };

        if let Some(cancel) = cancel {
            cancel.cancel();
        }
        // Teardown must not race an in-flight tick: wait for the loop to
        // exit even when a concurrent stop() initiated the cancellation
        if let Some(done) = done {
            done.cancelled().await;
        }

        let mut errs: Vec<String> = Vec::new();
        if let Some(camera) = camera {
            if let Err(e) = camera.close().await {
                errs.push(format!("closing camera: {e}"));
            }
        }
        if let Some(processor) = processor {
            if let Err(e) = processor.close().await {
                errs.push(format!("closing processor: {e}"));
            }
        }
        if let Some(sender) = vmc_sender {
            if let Err(e) = sender.close() {
                errs.push(format!("closing VMC sender: {e}"));
            }
        }
        if let Some(sender) = osc_sender {
            if let Err(e) = sender.close() {
                errs.push(format!("closing OSC sender: {e}"));
            }
        }

        // Dropping the senders closes every subscriber channel, releasing
        // blocked readers.
        self.subscribers.lock().await.clear();

        info!("Tracker closed");
        if errs.is_empty() {
            Ok(())
        } else {
            Err(TrackerError::Teardown(errs.join("; ")).into())
        }
    }
}

impl Inner {
    fn check_idle(&self, operation: &'static str) -> Result<()> {
        if self.state != TrackerState::Idle {
            return Err(TrackerError::InvalidState {
                operation,
                state: self.state.as_str(),
            }
            .into());
        }
        Ok(())
    }
}

/// Everything the background loop task needs, snapshotted at `start()`.
/// Dependencies cannot change while running (registration is Idle-only), so
/// the loop holds its own references and never locks around the slow
/// capture/detect calls.
struct FrameLoop {
    period: Duration,
    enable_face: bool,
    enable_hands: bool,
    enable_pose: bool,
    camera: Option<Arc<dyn CameraSource>>,
    processor: Option<Arc<dyn Processor>>,
    vmc_sender: Option<Arc<dyn Sender>>,
    osc_sender: Option<Arc<dyn Sender>>,
    smoothers: Arc<Smoothers>,
    subscribers: SubscriberList,
    cancel: CancellationToken,
}

impl FrameLoop {
    async fn run(self) {
        let mut ticker = tokio::time::interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        // Frames are strictly sequential: a tick in progress runs to
        // completion before cancellation is honored.
        let mut frame_number: u64 = 0;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {
                    frame_number += 1;
                    self.process_frame(frame_number).await;
                }
            }
        }
        debug!("Frame loop exited after {} frames", frame_number);
    }

    /// Capture, detect, smooth, and fan out a single frame.
    async fn process_frame(&self, frame_number: u64) {
        let mut data = match (&self.camera, &self.processor) {
            (Some(camera), Some(processor)) => {
                // Capture or detection failures drop this frame; the next
                // tick is a fresh attempt.
                let frame = match camera.read().await {
                    Ok(frame) => frame,
                    Err(e) => {
                        let e = TrackerError::Capture(e.to_string());
                        debug!("Dropping frame {frame_number}: {e}");
                        return;
                    }
                };
                match processor.process(&frame).await {
                    Ok(data) => data,
                    Err(e) => {
                        let e = TrackerError::Detection(e.to_string());
                        debug!("Dropping frame {frame_number}: {e}");
                        return;
                    }
                }
            }
            // Without a camera and detector, produce placeholder snapshots
            // so integration against the pipeline works without hardware.
            _ => TrackingData::default(),
        };

        if !self.enable_face {
            data.face = None;
        }
        if !self.enable_hands {
            data.left_hand = None;
            data.right_hand = None;
        }
        if !self.enable_pose {
            data.pose = None;
        }

        if let Some(face) = data.face.as_mut() {
            face.landmarks = self.smoothers.face.smooth(&face.landmarks);
        }
        if let Some(hand) = data.left_hand.as_mut() {
            hand.landmarks = self.smoothers.left_hand.smooth(&hand.landmarks);
        }
        if let Some(hand) = data.right_hand.as_mut() {
            hand.landmarks = self.smoothers.right_hand.smooth(&hand.landmarks);
        }
        if let Some(pose) = data.pose.as_mut() {
            pose.landmarks = self.smoothers.pose.smooth(&pose.landmarks);
        }

        // The coordinator owns sequencing: whatever the detector set is
        // overwritten with the authoritative counter and capture time.
        data.frame_number = frame_number;
        data.timestamp = SystemTime::now();
        let data = Arc::new(data);

        // Sender failures are per-tick and never fatal to the loop
        if let Some(sender) = &self.vmc_sender {
            if let Err(e) = sender.send(&data) {
                warn!("VMC send failed: {e}");
            }
        }
        if let Some(sender) = &self.osc_sender {
            if let Err(e) = sender.send(&data) {
                warn!("OSC send failed: {e}");
            }
        }

        let subscribers = self.subscribers.lock().await.clone();
        for tx in &subscribers {
            // Full buffer means this subscriber misses the frame
            let _ = tx.try_send(Arc::clone(&data));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VtrackError;
    use crate::tracking::{FaceData, Frame, HandData, Landmark, Point3D};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use tokio::time::timeout;

    const RECV_TIMEOUT: Duration = Duration::from_secs(2);

    fn fast_config() -> Config {
        let mut cfg = Config::default();
        cfg.camera.fps = 200;
        cfg
    }

    #[derive(Default)]
    struct MockCamera {
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl CameraSource for MockCamera {
        async fn open(&self, _device_id: u32, _width: u32, _height: u32, _fps: u32) -> Result<()> {
            Ok(())
        }

        async fn read(&self) -> Result<Frame> {
            Ok(Frame {
                data: vec![0; 640 * 480 * 3],
                width: 640,
                height: 480,
            })
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct MockProcessor {
        closed: Arc<AtomicBool>,
        calls: Arc<AtomicU64>,
        /// Landmark x positions to cycle through, one per call
        positions: Vec<f64>,
    }

    impl MockProcessor {
        fn new() -> Self {
            Self {
                closed: Arc::new(AtomicBool::new(false)),
                calls: Arc::new(AtomicU64::new(0)),
                positions: vec![0.0],
            }
        }
    }

    #[async_trait]
    impl Processor for MockProcessor {
        async fn process(&self, _frame: &Frame) -> Result<TrackingData> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as usize;
            let x = self.positions[call % self.positions.len()];

            let mut face = FaceData {
                landmarks: vec![
                    Landmark {
                        point: Point3D::new(x, 0.0, 0.0),
                        visibility: 1.0,
                    };
                    468
                ],
                ..Default::default()
            };
            face.blend_shapes.insert("smile".to_string(), 0.5);

            Ok(TrackingData {
                face: Some(face),
                left_hand: Some(HandData {
                    is_left: true,
                    landmarks: vec![Landmark::default(); 21],
                    confidence: 0.9,
                }),
                ..Default::default()
            })
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Holds each `process` call open long enough for shutdown to race it.
    struct SlowProcessor {
        closed: Arc<AtomicBool>,
        in_flight: Arc<AtomicBool>,
        delay: Duration,
    }

    #[async_trait]
    impl Processor for SlowProcessor {
        async fn process(&self, _frame: &Frame) -> Result<TrackingData> {
            self.in_flight.store(true, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.in_flight.store(false, Ordering::SeqCst);
            Ok(TrackingData::default())
        }

        async fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Fails the first `failures` reads, then delivers frames normally.
    struct FlakyCamera {
        calls: Arc<AtomicU64>,
        failures: u64,
    }

    #[async_trait]
    impl CameraSource for FlakyCamera {
        async fn open(&self, _device_id: u32, _width: u32, _height: u32, _fps: u32) -> Result<()> {
            Ok(())
        }

        async fn read(&self) -> Result<Frame> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                return Err(TrackerError::Capture("device busy".to_string()).into());
            }
            Ok(Frame {
                data: vec![0; 640 * 480 * 3],
                width: 640,
                height: 480,
            })
        }

        async fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    struct MockSender {
        closed: Arc<AtomicBool>,
        sent: Arc<std::sync::Mutex<Vec<u64>>>,
    }

    impl MockSender {
        fn new() -> Self {
            Self {
                closed: Arc::new(AtomicBool::new(false)),
                sent: Arc::new(std::sync::Mutex::new(Vec::new())),
            }
        }
    }

    impl Sender for MockSender {
        fn send(&self, data: &TrackingData) -> Result<()> {
            self.sent.lock().unwrap().push(data.frame_number);
            Ok(())
        }

        fn close(&self) -> Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    fn assert_tracker_err(result: Result<()>, expected: &TrackerError) {
        match result {
            Err(VtrackError::Tracker(e)) => assert_eq!(
                std::mem::discriminant(&e),
                std::mem::discriminant(expected),
                "got {e:?}, want {expected:?}"
            ),
            other => panic!("expected {expected:?}, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_lifecycle_transitions() {
        let tracker = Tracker::new(fast_config()).unwrap();
        assert_eq!(tracker.state().await, TrackerState::Idle);

        // From Idle only start succeeds
        assert_tracker_err(tracker.stop().await, &TrackerError::NotRunning);

        tracker.start().await.unwrap();
        assert_eq!(tracker.state().await, TrackerState::Running);
        assert_tracker_err(tracker.start().await, &TrackerError::AlreadyRunning);

        tracker.stop().await.unwrap();
        assert_eq!(tracker.state().await, TrackerState::Stopped);
        assert_tracker_err(tracker.stop().await, &TrackerError::NotRunning);

        // Stopped tracker can be restarted
        tracker.start().await.unwrap();
        assert_eq!(tracker.state().await, TrackerState::Running);

        tracker.close().await.unwrap();
        assert_eq!(tracker.state().await, TrackerState::Closed);

        // Closed is absorbing: everything reports already closed
        assert_tracker_err(tracker.close().await, &TrackerError::AlreadyClosed);
        assert_tracker_err(tracker.start().await, &TrackerError::AlreadyClosed);
        assert_tracker_err(tracker.stop().await, &TrackerError::AlreadyClosed);
    }

    #[tokio::test]
    async fn test_subscribe_receives_processed_frames() {
        let tracker = Tracker::new(fast_config()).unwrap();
        tracker.set_camera_source(MockCamera::default()).await.unwrap();
        tracker.set_processor(MockProcessor::new()).await.unwrap();

        let mut rx = tracker.subscribe().await;
        tracker.start().await.unwrap();

        let data = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(data.frame_number, 1);

        let face = data.face.as_ref().unwrap();
        assert_eq!(face.landmarks.len(), 468);
        assert_eq!(face.blend_shapes.get("smile"), Some(&0.5));

        tracker.close().await.unwrap();

        // Channel closes with the tracker; drain any buffered frames first
        loop {
            match timeout(RECV_TIMEOUT, rx.recv()).await.unwrap() {
                Some(_) => continue,
                None => break,
            }
        }
    }

    #[tokio::test]
    async fn test_placeholder_frames_without_dependencies() {
        let tracker = Tracker::new(fast_config()).unwrap();
        let mut rx = tracker.subscribe().await;
        tracker.start().await.unwrap();

        let data = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(data.frame_number, 1);
        assert!(data.face.is_none());
        assert!(data.pose.is_none());

        tracker.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_frame_numbers_strictly_increasing() {
        let tracker = Tracker::new(fast_config()).unwrap();
        let mut rx = tracker.subscribe().await;
        tracker.start().await.unwrap();

        let mut prev = 0;
        for _ in 0..5 {
            let data = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
            assert!(data.frame_number > prev);
            prev = data.frame_number;
        }

        tracker.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_slow_subscriber_does_not_stall_others() {
        let tracker = Tracker::new(fast_config()).unwrap();
        // First subscriber never reads; its buffer fills after 10 frames
        let _stalled = tracker.subscribe().await;
        let mut active = tracker.subscribe().await;
        tracker.start().await.unwrap();

        // The active subscriber keeps receiving well past the stalled
        // subscriber's capacity
        let mut latest = 0;
        while latest < 15 {
            let data = timeout(RECV_TIMEOUT, active.recv()).await.unwrap().unwrap();
            latest = data.frame_number;
        }

        tracker.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_registration_rejected_while_running() {
        let tracker = Tracker::new(fast_config()).unwrap();
        tracker.start().await.unwrap();

        let err = tracker.set_camera_source(MockCamera::default()).await;
        assert_tracker_err(
            err,
            &TrackerError::InvalidState {
                operation: "set camera source",
                state: "running",
            },
        );

        tracker.close().await.unwrap();
        let err = tracker.set_processor(MockProcessor::new()).await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_close_tears_down_dependencies() {
        let tracker = Tracker::new(fast_config()).unwrap();

        let camera = MockCamera::default();
        let camera_closed = Arc::clone(&camera.closed);
        let processor = MockProcessor::new();
        let processor_closed = Arc::clone(&processor.closed);
        let vmc = MockSender::new();
        let vmc_closed = Arc::clone(&vmc.closed);

        tracker.set_camera_source(camera).await.unwrap();
        tracker.set_processor(processor).await.unwrap();
        tracker.set_vmc_sender(vmc).await.unwrap();

        tracker.start().await.unwrap();
        tracker.close().await.unwrap();

        assert!(camera_closed.load(Ordering::SeqCst));
        assert!(processor_closed.load(Ordering::SeqCst));
        assert!(vmc_closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_senders_receive_every_frame() {
        let tracker = Tracker::new(fast_config()).unwrap();
        let vmc = MockSender::new();
        let sent = Arc::clone(&vmc.sent);
        tracker.set_vmc_sender(vmc).await.unwrap();

        let mut rx = tracker.subscribe().await;
        tracker.start().await.unwrap();
        for _ in 0..3 {
            timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        }
        tracker.stop().await.unwrap();

        let frames = sent.lock().unwrap().clone();
        assert!(frames.len() >= 3);
        assert!(frames.windows(2).all(|w| w[1] > w[0]));
    }

    #[tokio::test]
    async fn test_stop_halts_fanout() {
        let tracker = Tracker::new(fast_config()).unwrap();
        let mut rx = tracker.subscribe().await;
        tracker.start().await.unwrap();

        timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        tracker.stop().await.unwrap();

        // Drain frames produced before stop returned; afterwards the
        // channel stays open but silent
        while rx.try_recv().is_ok() {}
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());

        tracker.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_stop_and_close_wait_for_inflight_frame() {
        let tracker = Arc::new(Tracker::new(fast_config()).unwrap());

        let processor = SlowProcessor {
            closed: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicBool::new(false)),
            delay: Duration::from_millis(400),
        };
        let in_flight = Arc::clone(&processor.in_flight);
        let closed = Arc::clone(&processor.closed);

        tracker.set_camera_source(MockCamera::default()).await.unwrap();
        tracker.set_processor(processor).await.unwrap();
        tracker.start().await.unwrap();

        // Let the first tick get into the slow process() call
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(in_flight.load(Ordering::SeqCst));

        // stop() and close() race; whichever loses the state check still
        // has to wait for the loop before returning
        let stopper = {
            let tracker = Arc::clone(&tracker);
            tokio::spawn(async move {
                let _ = tracker.stop().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let _ = tracker.close().await;

        // Teardown happened, and only after the in-flight frame finished
        assert!(closed.load(Ordering::SeqCst));
        assert!(!in_flight.load(Ordering::SeqCst));

        stopper.await.unwrap();
    }

    #[tokio::test]
    async fn test_capture_failures_drop_frames_and_recover() {
        let tracker = Tracker::new(fast_config()).unwrap();
        tracker
            .set_camera_source(FlakyCamera {
                calls: Arc::new(AtomicU64::new(0)),
                failures: 2,
            })
            .await
            .unwrap();
        tracker.set_processor(MockProcessor::new()).await.unwrap();

        let mut rx = tracker.subscribe().await;
        tracker.start().await.unwrap();

        // Frames 1 and 2 are dropped; delivery resumes from frame 3
        let data = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert!(data.frame_number >= 3);
        assert!(data.face.is_some());

        tracker.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_smoothing_applied_before_fanout() {
        let mut cfg = fast_config();
        cfg.tracking.smoothing_factor = 0.5;
        let tracker = Tracker::new(cfg).unwrap();

        let mut processor = MockProcessor::new();
        processor.positions = vec![0.0, 100.0];
        tracker.set_camera_source(MockCamera::default()).await.unwrap();
        tracker.set_processor(processor).await.unwrap();

        let mut rx = tracker.subscribe().await;
        tracker.start().await.unwrap();

        let first = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        let second = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        tracker.close().await.unwrap();

        // First observation passes through; the jump to 100 is damped
        let x1 = first.face.as_ref().unwrap().landmarks[0].point.x;
        let x2 = second.face.as_ref().unwrap().landmarks[0].point.x;
        assert_eq!(x1, 0.0);
        assert!(x2 > 0.0 && x2 < 100.0, "expected damped value, got {x2}");
    }

    #[tokio::test]
    async fn test_disabled_channels_are_stripped() {
        let mut cfg = fast_config();
        cfg.tracking.enable_hands = false;
        let tracker = Tracker::new(cfg).unwrap();
        tracker.set_camera_source(MockCamera::default()).await.unwrap();
        tracker.set_processor(MockProcessor::new()).await.unwrap();

        let mut rx = tracker.subscribe().await;
        tracker.start().await.unwrap();

        let data = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert!(data.face.is_some());
        assert!(data.left_hand.is_none());

        tracker.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_subscribe_after_close_returns_closed_channel() {
        let tracker = Tracker::new(fast_config()).unwrap();
        tracker.close().await.unwrap();

        let mut rx = tracker.subscribe().await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut cfg = Config::default();
        cfg.tracking.smoothing_factor = 2.0;
        assert!(Tracker::new(cfg).is_err());
    }
}
