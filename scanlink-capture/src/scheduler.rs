//! The continuous capture scheduler.
//!
//! Owns the whole capture loop: device acquisition, periodic frame
//! submission, in-flight gating, duplicate suppression, and cooldown
//! pacing.
//!
//! ```text
//!  Idle ──start()──► Armed ──tick──► Capturing ──new key──► Cooldown
//!                      ▲                  │                     │
//!                      ├──── same key ────┘                     │
//!                      └──────────── pause elapsed ─────────────┘
//!
//!  Armed / Capturing / Cooldown ──stop()──► Idle
//! ```
//!
//! Concurrency discipline: at most one decode submission is ever
//! outstanding. `in_flight` is the sole gate — a tick that finds it
//! set does nothing (backpressure by dropping, never queuing), and
//! every completion path clears it, or the loop would stall for good.

use std::sync::Arc;
use std::time::Duration;

use scanlink_core::{ScanlinkError, ScannedItem};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::decode::BarcodeDecoder;
use crate::device::FrameSource;

// ── ScanConfig ───────────────────────────────────────────────────

/// Timing parameters of the capture loop. These are protocol
/// parameters, not implementation details.
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Continuous-loop tick interval.
    pub tick_interval: Duration,
    /// Pause after a successful scan before the loop resumes.
    pub cooldown: Duration,
    /// Decode deadline for continuous-loop submissions.
    pub loop_timeout: Duration,
    /// Decode deadline for the manual single-shot path, roughly
    /// double the loop deadline.
    pub manual_timeout: Duration,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(500),
            cooldown: Duration::from_millis(2500),
            loop_timeout: Duration::from_secs(4),
            manual_timeout: Duration::from_secs(8),
        }
    }
}

// ── ScannerPhase ─────────────────────────────────────────────────

/// Capture-side lifecycle, with validated transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScannerPhase {
    /// Device not held. Initial / terminal state.
    #[default]
    Idle,
    /// Device acquired, timer running.
    Armed,
    /// One submission outstanding.
    Capturing,
    /// Post-success pause; timer cancelled until it elapses.
    Cooldown,
}

impl std::fmt::Display for ScannerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Armed => write!(f, "Armed"),
            Self::Capturing => write!(f, "Capturing"),
            Self::Cooldown => write!(f, "Cooldown"),
        }
    }
}

impl ScannerPhase {
    /// `Idle → Armed` once the device is acquired.
    pub fn arm(&mut self) -> Result<(), ScanlinkError> {
        match self {
            Self::Idle => {
                *self = Self::Armed;
                Ok(())
            }
            _ => Err(ScanlinkError::ProtocolViolation("cannot arm: not Idle")),
        }
    }

    /// `Armed → Capturing` when a submission goes out.
    pub fn begin_capture(&mut self) -> Result<(), ScanlinkError> {
        match self {
            Self::Armed => {
                *self = Self::Capturing;
                Ok(())
            }
            _ => Err(ScanlinkError::ProtocolViolation(
                "cannot begin capture: not Armed",
            )),
        }
    }

    /// `Capturing → Armed` on a completion that triggers no cooldown.
    pub fn finish_capture(&mut self) -> Result<(), ScanlinkError> {
        match self {
            Self::Capturing => {
                *self = Self::Armed;
                Ok(())
            }
            _ => Err(ScanlinkError::ProtocolViolation(
                "cannot finish capture: not Capturing",
            )),
        }
    }

    /// `Capturing → Cooldown` after a fresh identity key.
    pub fn begin_cooldown(&mut self) -> Result<(), ScanlinkError> {
        match self {
            Self::Capturing => {
                *self = Self::Cooldown;
                Ok(())
            }
            _ => Err(ScanlinkError::ProtocolViolation(
                "cannot begin cooldown: not Capturing",
            )),
        }
    }

    /// `Cooldown → Armed` once the pause elapses.
    pub fn rearm(&mut self) -> Result<(), ScanlinkError> {
        match self {
            Self::Cooldown => {
                *self = Self::Armed;
                Ok(())
            }
            _ => Err(ScanlinkError::ProtocolViolation(
                "cannot rearm: not in Cooldown",
            )),
        }
    }

    /// Back to `Idle` from anywhere. Infallible — `stop()` must work
    /// from every state.
    pub fn disarm(&mut self) {
        *self = Self::Idle;
    }
}

// ── Feedback ─────────────────────────────────────────────────────

/// What the surrounding UI hears about scanning progress.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanFeedback {
    /// A fresh item was decoded and relayed ("Added").
    Scanned(ScannedItem),
    /// The desktop reported the item as already in the collection
    /// ("Already in collection").
    Duplicate(ScannedItem),
}

/// How one decode submission ended.
#[derive(Debug)]
enum SubmissionOutcome {
    Decoded(ScannedItem),
    Failed(ScanlinkError),
    TimedOut,
    Cancelled,
}

// ── CaptureScheduler ─────────────────────────────────────────────

/// Drives the continuous capture loop over an injected frame source
/// and decode capability.
pub struct CaptureScheduler<S: FrameSource, D: BarcodeDecoder + 'static> {
    source: S,
    decoder: Arc<D>,
    config: ScanConfig,
    phase: ScannerPhase,
    last_identity_key: Option<String>,
    in_flight: bool,
    scan_count: u64,
    device_held: bool,
    cancel: CancellationToken,
    emissions: mpsc::Sender<ScannedItem>,
    feedback: mpsc::UnboundedSender<ScanFeedback>,
}

impl<S: FrameSource, D: BarcodeDecoder + 'static> CaptureScheduler<S, D> {
    /// Build a scheduler. Decoded items flow out through `emissions`
    /// (toward the relay) and UI notifications through `feedback`.
    pub fn new(
        source: S,
        decoder: D,
        config: ScanConfig,
        emissions: mpsc::Sender<ScannedItem>,
        feedback: mpsc::UnboundedSender<ScanFeedback>,
    ) -> Self {
        Self {
            source,
            decoder: Arc::new(decoder),
            config,
            phase: ScannerPhase::Idle,
            last_identity_key: None,
            in_flight: false,
            scan_count: 0,
            device_held: false,
            cancel: CancellationToken::new(),
            emissions,
            feedback,
        }
    }

    pub fn phase(&self) -> ScannerPhase {
        self.phase
    }

    /// Items relayed so far.
    pub fn scan_count(&self) -> u64 {
        self.scan_count
    }

    /// A token other tasks can cancel to stop the loop.
    pub fn stop_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Acquire the capture device and arm the loop.
    ///
    /// On failure the device error is surfaced and the scheduler stays
    /// `Idle` until the user retries.
    pub async fn start(&mut self) -> Result<(), ScanlinkError> {
        if self.phase != ScannerPhase::Idle {
            return Err(ScanlinkError::ProtocolViolation("start() while running"));
        }
        self.source.acquire().await?;
        self.device_held = true;
        if self.cancel.is_cancelled() {
            // restarted after a stop(): fresh token
            self.cancel = CancellationToken::new();
        }
        self.phase.arm()?;
        Ok(())
    }

    /// Run the capture loop until stopped or the device fails.
    ///
    /// Intended to be spawned on the runtime:
    ///
    /// ```no_run
    /// # use scanlink_capture::scheduler::CaptureScheduler;
    /// # use scanlink_capture::{device::FrameSource, decode::BarcodeDecoder};
    /// # async fn example<S, D>(mut sched: CaptureScheduler<S, D>)
    /// # where S: FrameSource + Send + 'static, D: BarcodeDecoder + 'static {
    /// sched.start().await.unwrap();
    /// let stop = sched.stop_handle();
    /// tokio::spawn(async move { sched.run().await });
    /// // … later …
    /// stop.cancel();
    /// # }
    /// ```
    pub async fn run(&mut self) -> Result<(), ScanlinkError> {
        if self.phase != ScannerPhase::Armed {
            return Err(ScanlinkError::ProtocolViolation("run() before start()"));
        }

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let (done_tx, mut done_rx) = mpsc::channel::<SubmissionOutcome>(1);

        let result = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break Ok(()),

                _ = ticker.tick() => {
                    if let Err(e) = self.on_tick(&done_tx).await {
                        break Err(e); // device gone mid-loop
                    }
                }

                Some(outcome) = done_rx.recv() => {
                    if self.on_completion(outcome) {
                        // Cooldown: the timer stays cancelled until the
                        // pause elapses, then the key clears and the
                        // loop re-arms.
                        tokio::select! {
                            _ = self.cancel.cancelled() => break Ok(()),
                            _ = tokio::time::sleep(self.config.cooldown) => {
                                self.last_identity_key = None;
                                if let Err(e) = self.phase.rearm() {
                                    break Err(e);
                                }
                                ticker.reset();
                            }
                        }
                    }
                }
            }
        };

        self.teardown().await;
        result
    }

    /// Manual single-shot scan, outside the continuous loop.
    ///
    /// Runs under the longer manual deadline and, unlike the loop,
    /// surfaces every failure to the caller so it can re-enable input.
    pub async fn scan_once(&mut self) -> Result<ScannedItem, ScanlinkError> {
        if self.in_flight {
            return Err(ScanlinkError::ProtocolViolation(
                "a submission is already in flight",
            ));
        }
        if !self.device_held {
            return Err(ScanlinkError::Device("capture device not acquired".into()));
        }

        self.in_flight = true;
        let result = match self.source.snapshot().await {
            Err(e) => Err(e),
            Ok(frame) => {
                let decode = self.decoder.decode(frame);
                match tokio::time::timeout(self.config.manual_timeout, decode).await {
                    Err(_) => Err(ScanlinkError::Timeout(self.config.manual_timeout)),
                    Ok(decoded) => decoded,
                }
            }
        };
        self.in_flight = false;

        let item = result?;
        if self.last_identity_key.as_deref() != Some(item.identity_key.as_str()) {
            self.emit(item.clone());
        }
        Ok(item)
    }

    /// Cancel the timer, abort any in-flight submission, release the
    /// device, and clear all local state.
    ///
    /// Safe to call any number of times, from any state; the device is
    /// released exactly once. `run()` invokes the same teardown on
    /// every exit path.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        self.teardown().await;
    }

    async fn teardown(&mut self) {
        self.cancel.cancel();
        if self.device_held {
            self.source.release().await;
            self.device_held = false;
        }
        self.in_flight = false;
        self.last_identity_key = None;
        self.phase.disarm();
    }

    // ── Loop internals ───────────────────────────────────────────

    async fn on_tick(
        &mut self,
        done_tx: &mpsc::Sender<SubmissionOutcome>,
    ) -> Result<(), ScanlinkError> {
        if self.in_flight {
            // One submission outstanding — drop this tick.
            return Ok(());
        }
        if self.phase != ScannerPhase::Armed {
            return Ok(());
        }

        let frame = self.source.snapshot().await?;
        self.in_flight = true;
        self.phase.begin_capture()?;

        let decoder = Arc::clone(&self.decoder);
        let deadline = self.config.loop_timeout;
        let abort = self.cancel.child_token();
        let done = done_tx.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = abort.cancelled() => SubmissionOutcome::Cancelled,
                result = tokio::time::timeout(deadline, decoder.decode(frame)) => match result {
                    Err(_) => SubmissionOutcome::TimedOut,
                    Ok(Err(e)) => SubmissionOutcome::Failed(e),
                    Ok(Ok(item)) => SubmissionOutcome::Decoded(item),
                },
            };
            let _ = done.send(outcome).await;
        });
        Ok(())
    }

    /// Handle a submission completion. Returns `true` when a fresh
    /// identity key put the loop into cooldown.
    fn on_completion(&mut self, outcome: SubmissionOutcome) -> bool {
        self.in_flight = false;

        match outcome {
            SubmissionOutcome::Cancelled => false,
            SubmissionOutcome::TimedOut => {
                debug!("decode submission timed out");
                let _ = self.phase.finish_capture();
                false
            }
            SubmissionOutcome::Failed(e) => {
                // Swallowed: the next tick retries with a fresh frame.
                debug!("decode failed: {e}");
                let _ = self.phase.finish_capture();
                false
            }
            SubmissionOutcome::Decoded(item) => {
                if self.last_identity_key.as_deref() == Some(item.identity_key.as_str()) {
                    // Same physical item still in frame.
                    let _ = self.phase.finish_capture();
                    false
                } else {
                    self.emit(item);
                    let _ = self.phase.begin_cooldown();
                    true
                }
            }
        }
    }

    fn emit(&mut self, item: ScannedItem) {
        if self.emissions.try_send(item.clone()).is_err() {
            debug!("emission dropped, channel full or closed");
        }
        self.last_identity_key = Some(item.identity_key.clone());
        self.scan_count += 1;
        let _ = self.feedback.send(ScanFeedback::Scanned(item));
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Frame;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // ── Fakes ────────────────────────────────────────────────────

    #[derive(Default)]
    struct Counters {
        acquires: AtomicUsize,
        snapshots: AtomicUsize,
        releases: AtomicUsize,
    }

    struct FakeSource {
        counters: Arc<Counters>,
        fail_acquire: bool,
    }

    impl FakeSource {
        fn new(counters: Arc<Counters>) -> Self {
            Self {
                counters,
                fail_acquire: false,
            }
        }

        fn failing(counters: Arc<Counters>) -> Self {
            Self {
                counters,
                fail_acquire: true,
            }
        }
    }

    #[async_trait]
    impl FrameSource for FakeSource {
        async fn acquire(&mut self) -> Result<(), ScanlinkError> {
            self.counters.acquires.fetch_add(1, Ordering::SeqCst);
            if self.fail_acquire {
                return Err(ScanlinkError::Device("no camera attached".into()));
            }
            Ok(())
        }

        async fn snapshot(&mut self) -> Result<Frame, ScanlinkError> {
            self.counters.snapshots.fetch_add(1, Ordering::SeqCst);
            Ok(Frame::new(vec![0u8; 4]))
        }

        async fn release(&mut self) {
            self.counters.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// What the scripted decoder should do for one submission.
    #[derive(Debug, Clone)]
    enum Script {
        Key(&'static str),
        Fail,
        Hang,
    }

    struct ScriptedDecoder {
        script: Mutex<VecDeque<Script>>,
        calls: AtomicUsize,
    }

    impl ScriptedDecoder {
        /// The last entry repeats forever.
        fn new(script: Vec<Script>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicUsize::new(0),
            }
        }

        fn next(&self) -> Script {
            let mut queue = self.script.lock().unwrap();
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().expect("empty decoder script")
            }
        }
    }

    #[async_trait]
    impl BarcodeDecoder for ScriptedDecoder {
        async fn decode(&self, _frame: Frame) -> Result<ScannedItem, ScanlinkError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.next() {
                Script::Key(code) => Ok(ScannedItem::new(code)),
                Script::Fail => Err(ScanlinkError::Decode("no barcode found".into())),
                Script::Hang => std::future::pending().await,
            }
        }
    }

    fn fast_config() -> ScanConfig {
        ScanConfig {
            tick_interval: Duration::from_millis(20),
            cooldown: Duration::from_millis(80),
            loop_timeout: Duration::from_millis(60),
            manual_timeout: Duration::from_millis(120),
        }
    }

    type TestScheduler = CaptureScheduler<FakeSource, ScriptedDecoder>;

    fn build(
        source: FakeSource,
        script: Vec<Script>,
        config: ScanConfig,
    ) -> (
        TestScheduler,
        mpsc::Receiver<ScannedItem>,
        mpsc::UnboundedReceiver<ScanFeedback>,
    ) {
        let (emit_tx, emit_rx) = mpsc::channel(16);
        let (fb_tx, fb_rx) = mpsc::unbounded_channel();
        let sched = CaptureScheduler::new(
            source,
            ScriptedDecoder::new(script),
            config,
            emit_tx,
            fb_tx,
        );
        (sched, emit_rx, fb_rx)
    }

    async fn recv_emission(rx: &mut mpsc::Receiver<ScannedItem>) -> ScannedItem {
        tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("no emission within deadline")
            .expect("emission channel closed")
    }

    // ── Phase machine ────────────────────────────────────────────

    #[test]
    fn phase_happy_path() {
        let mut phase = ScannerPhase::default();
        phase.arm().unwrap();
        phase.begin_capture().unwrap();
        phase.begin_cooldown().unwrap();
        phase.rearm().unwrap();
        assert_eq!(phase, ScannerPhase::Armed);

        phase.disarm();
        assert_eq!(phase, ScannerPhase::Idle);
    }

    #[test]
    fn phase_failed_capture_rearms() {
        let mut phase = ScannerPhase::Armed;
        phase.begin_capture().unwrap();
        phase.finish_capture().unwrap();
        assert_eq!(phase, ScannerPhase::Armed);
    }

    #[test]
    fn phase_invalid_transitions() {
        let mut phase = ScannerPhase::Idle;
        assert!(phase.begin_capture().is_err());
        assert!(phase.rearm().is_err());

        let mut phase = ScannerPhase::Cooldown;
        assert!(phase.begin_capture().is_err());
    }

    #[test]
    fn disarm_from_any_state() {
        for start in [
            ScannerPhase::Idle,
            ScannerPhase::Armed,
            ScannerPhase::Capturing,
            ScannerPhase::Cooldown,
        ] {
            let mut phase = start;
            phase.disarm();
            assert_eq!(phase, ScannerPhase::Idle);
        }
    }

    // ── start() ──────────────────────────────────────────────────

    #[tokio::test]
    async fn start_surfaces_device_error_and_stays_idle() {
        let counters = Arc::new(Counters::default());
        let (mut sched, _emit, _fb) = build(
            FakeSource::failing(counters.clone()),
            vec![Script::Fail],
            fast_config(),
        );

        let err = sched.start().await.unwrap_err();
        assert!(matches!(err, ScanlinkError::Device(_)));
        assert_eq!(sched.phase(), ScannerPhase::Idle);
        assert!(sched.run().await.is_err()); // not armed
    }

    #[tokio::test]
    async fn run_before_start_is_rejected() {
        let counters = Arc::new(Counters::default());
        let (mut sched, _emit, _fb) = build(
            FakeSource::new(counters),
            vec![Script::Key("A")],
            fast_config(),
        );
        assert!(sched.run().await.is_err());
    }

    // ── Continuous loop ──────────────────────────────────────────

    #[tokio::test]
    async fn fresh_key_is_emitted_then_cooldown_holds() {
        let counters = Arc::new(Counters::default());
        let mut config = fast_config();
        config.cooldown = Duration::from_secs(30); // effectively forever
        let (mut sched, mut emit, mut fb) = build(
            FakeSource::new(counters.clone()),
            vec![Script::Key("00001234567811")],
            config,
        );

        sched.start().await.unwrap();
        let stop = sched.stop_handle();
        let handle = tokio::spawn(async move {
            let _ = sched.run().await;
            sched
        });

        let item = recv_emission(&mut emit).await;
        assert_eq!(item.identity_key, "00001234567811");
        match fb.recv().await.unwrap() {
            ScanFeedback::Scanned(scanned) => assert_eq!(scanned.identity_key, "00001234567811"),
            other => panic!("expected Scanned, got {other:?}"),
        }

        // Cooldown: no further emission while the pause holds.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(emit.try_recv().is_err());

        stop.cancel();
        let sched = handle.await.unwrap();
        assert_eq!(sched.scan_count(), 1);
        assert_eq!(sched.phase(), ScannerPhase::Idle);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cooldown_elapse_allows_same_key_again() {
        let counters = Arc::new(Counters::default());
        let (mut sched, mut emit, _fb) = build(
            FakeSource::new(counters),
            vec![Script::Key("A")],
            fast_config(),
        );

        sched.start().await.unwrap();
        let stop = sched.stop_handle();
        let handle = tokio::spawn(async move {
            let _ = sched.run().await;
            sched
        });

        // First emission, then the 80 ms cooldown clears the key and
        // the same physical item scans again.
        let first = recv_emission(&mut emit).await;
        let second = recv_emission(&mut emit).await;
        assert_eq!(first.identity_key, "A");
        assert_eq!(second.identity_key, "A");

        stop.cancel();
        let sched = handle.await.unwrap();
        assert!(sched.scan_count() >= 2);
    }

    #[tokio::test]
    async fn timeout_is_swallowed_and_next_tick_retries() {
        let counters = Arc::new(Counters::default());
        let (mut sched, mut emit, _fb) = build(
            FakeSource::new(counters.clone()),
            vec![Script::Hang, Script::Fail, Script::Key("B")],
            fast_config(),
        );

        sched.start().await.unwrap();
        let stop = sched.stop_handle();
        let handle = tokio::spawn(async move {
            let result = sched.run().await;
            (result, sched)
        });

        // The hanging submission times out, the failing one is
        // swallowed, and the loop still reaches the good decode.
        let item = recv_emission(&mut emit).await;
        assert_eq!(item.identity_key, "B");

        stop.cancel();
        let (result, sched) = handle.await.unwrap();
        assert!(result.is_ok());
        // One snapshot per submission: hang, fail, success at least.
        assert!(counters.snapshots.load(Ordering::SeqCst) >= 3);
        assert_eq!(sched.scan_count(), 1);
    }

    #[tokio::test]
    async fn ticks_are_dropped_while_in_flight() {
        let counters = Arc::new(Counters::default());
        // Hang forever: the only submission runs into its 60 ms
        // deadline while ticks keep firing every 20 ms.
        let (mut sched, _emit, _fb) = build(
            FakeSource::new(counters.clone()),
            vec![Script::Hang],
            fast_config(),
        );

        sched.start().await.unwrap();
        let stop = sched.stop_handle();
        let handle = tokio::spawn(async move {
            let _ = sched.run().await;
            sched
        });

        // ~3 tick periods inside one decode deadline.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(counters.snapshots.load(Ordering::SeqCst), 1);

        // After the timeout clears in_flight, the next tick snapshots
        // again.
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(counters.snapshots.load(Ordering::SeqCst) >= 2);

        stop.cancel();
        handle.await.unwrap();
    }

    // ── stop() ───────────────────────────────────────────────────

    #[tokio::test]
    async fn stop_is_idempotent_and_releases_once() {
        let counters = Arc::new(Counters::default());
        let (mut sched, _emit, _fb) = build(
            FakeSource::new(counters.clone()),
            vec![Script::Hang],
            fast_config(),
        );

        sched.start().await.unwrap();
        let stop = sched.stop_handle();
        let handle = tokio::spawn(async move {
            let _ = sched.run().await;
            sched
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        stop.cancel();
        let mut sched = handle.await.unwrap();

        // run()'s exit path already tore down; further stops are no-ops.
        sched.stop().await;
        sched.stop().await;

        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
        assert_eq!(sched.phase(), ScannerPhase::Idle);
    }

    #[tokio::test]
    async fn stop_without_start_is_safe() {
        let counters = Arc::new(Counters::default());
        let (mut sched, _emit, _fb) = build(
            FakeSource::new(counters.clone()),
            vec![Script::Fail],
            fast_config(),
        );

        sched.stop().await;
        sched.stop().await;
        assert_eq!(counters.releases.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn restart_after_stop_works() {
        let counters = Arc::new(Counters::default());
        let (mut sched, mut emit, _fb) = build(
            FakeSource::new(counters.clone()),
            vec![Script::Key("C")],
            fast_config(),
        );

        sched.start().await.unwrap();
        sched.stop().await;
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);

        // A fresh start re-acquires and the loop runs again.
        sched.start().await.unwrap();
        let stop = sched.stop_handle();
        let handle = tokio::spawn(async move {
            let _ = sched.run().await;
            sched
        });
        let item = recv_emission(&mut emit).await;
        assert_eq!(item.identity_key, "C");

        stop.cancel();
        handle.await.unwrap();
        assert_eq!(counters.acquires.load(Ordering::SeqCst), 2);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 2);
    }

    // ── Manual path ──────────────────────────────────────────────

    #[tokio::test]
    async fn scan_once_emits_and_suppresses_repeat() {
        let counters = Arc::new(Counters::default());
        let (mut sched, mut emit, _fb) = build(
            FakeSource::new(counters),
            vec![Script::Key("A"), Script::Key("A"), Script::Key("B")],
            fast_config(),
        );

        sched.start().await.unwrap();

        let first = sched.scan_once().await.unwrap();
        assert_eq!(first.identity_key, "A");
        assert_eq!(recv_emission(&mut emit).await.identity_key, "A");

        // Same key again: returned to the caller but not re-relayed.
        let repeat = sched.scan_once().await.unwrap();
        assert_eq!(repeat.identity_key, "A");
        assert!(emit.try_recv().is_err());

        // A different key relays.
        let other = sched.scan_once().await.unwrap();
        assert_eq!(other.identity_key, "B");
        assert_eq!(recv_emission(&mut emit).await.identity_key, "B");

        assert_eq!(sched.scan_count(), 2);
        sched.stop().await;
    }

    #[tokio::test]
    async fn scan_once_surfaces_timeout_and_recovers() {
        let counters = Arc::new(Counters::default());
        let mut config = fast_config();
        config.manual_timeout = Duration::from_millis(40);
        let (mut sched, mut emit, _fb) = build(
            FakeSource::new(counters),
            vec![Script::Hang, Script::Key("D")],
            config,
        );

        sched.start().await.unwrap();

        let err = sched.scan_once().await.unwrap_err();
        assert!(matches!(err, ScanlinkError::Timeout(_)));

        // in_flight cleared: the very next attempt succeeds.
        let item = sched.scan_once().await.unwrap();
        assert_eq!(item.identity_key, "D");
        assert_eq!(recv_emission(&mut emit).await.identity_key, "D");
        sched.stop().await;
    }

    #[tokio::test]
    async fn scan_once_surfaces_decode_failure() {
        let counters = Arc::new(Counters::default());
        let (mut sched, _emit, _fb) = build(
            FakeSource::new(counters),
            vec![Script::Fail, Script::Key("E")],
            fast_config(),
        );

        sched.start().await.unwrap();
        let err = sched.scan_once().await.unwrap_err();
        assert!(matches!(err, ScanlinkError::Decode(_)));

        assert!(sched.scan_once().await.is_ok());
        sched.stop().await;
    }

    #[tokio::test]
    async fn scan_once_requires_device() {
        let counters = Arc::new(Counters::default());
        let (mut sched, _emit, _fb) = build(
            FakeSource::new(counters),
            vec![Script::Key("F")],
            fast_config(),
        );

        assert!(matches!(
            sched.scan_once().await,
            Err(ScanlinkError::Device(_))
        ));
    }
}
