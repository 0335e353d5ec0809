//! Session state machine for one camera.

use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use super::config_store::ConfigStore;
use super::protocol::{self, FramePayload, Inbound, NoticePayload, Rejected};
use super::snapshot::{FrameInfo, LiveSnapshot};
use crate::data::{project, ChartProjection, DensitySample, HistoryBuffer};
use crate::transport::{Channel, ChannelEvent, Connector, Envelope, RetryPolicy, TransportError};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Active,
    Error,
}

impl SessionState {
    pub fn label(&self) -> &'static str {
        match self {
            SessionState::Idle => "Idle",
            SessionState::Connecting => "Connecting",
            SessionState::Active => "Live",
            SessionState::Error => "Error",
        }
    }

    /// Connecting or Active.
    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Orchestrates one streaming session at a time.
///
/// The controller owns at most one [`Channel`]. Events are applied only
/// when the caller drives it through [`poll`](Self::poll) or
/// [`next_event`](Self::next_event), so every transition runs to completion
/// before the next one starts.
#[derive(Debug)]
pub struct SessionController {
    connector: Arc<dyn Connector>,
    endpoint: String,
    retry: RetryPolicy,
    state: SessionState,
    camera_id: Option<String>,
    /// Threshold sent in every handshake of the current session.
    session_threshold: Option<f64>,
    channel: Option<Channel>,
    history: HistoryBuffer,
    snapshot: LiveSnapshot,
    notice: Option<String>,
}

impl SessionController {
    pub fn new(
        connector: Arc<dyn Connector>,
        endpoint: impl Into<String>,
        retry: RetryPolicy,
        history_capacity: usize,
    ) -> Self {
        Self {
            connector,
            endpoint: endpoint.into(),
            retry,
            state: SessionState::Idle,
            camera_id: None,
            session_threshold: None,
            channel: None,
            history: HistoryBuffer::new(history_capacity),
            snapshot: LiveSnapshot::default(),
            notice: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Camera the controller is scoped to, once a session was started or
    /// history was seeded for it.
    pub fn camera_id(&self) -> Option<&str> {
        self.camera_id.as_deref()
    }

    /// Threshold captured by the running session's handshake.
    pub fn session_threshold(&self) -> Option<f64> {
        self.session_threshold
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn snapshot(&self) -> &LiveSnapshot {
        &self.snapshot
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    /// Chart series for the current history contents.
    pub fn projection(&self) -> ChartProjection {
        project(&self.history.snapshot())
    }

    /// Pending user-visible failure, if any. Taking it clears it.
    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }

    /// Pre-fill history for `camera_id` before streaming starts.
    ///
    /// Replaces whatever the buffer held for another camera.
    pub fn seed_history<I>(&mut self, camera_id: &str, samples: I)
    where
        I: IntoIterator<Item = DensitySample>,
    {
        self.scope_to(camera_id);
        self.history.extend(samples);
        debug!(camera_id, samples = self.history.len(), "history seeded");
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Open a session for `camera_id`.
    ///
    /// Only valid from `Idle`; returns `false` (and does nothing) otherwise.
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, camera_id: &str, threshold: f64) -> bool {
        if self.state != SessionState::Idle || self.channel.is_some() {
            debug!(state = %self.state, camera_id, "ignoring start");
            return false;
        }

        self.scope_to(camera_id);
        let threshold = ConfigStore::new(threshold).threshold();
        self.session_threshold = Some(threshold);
        self.snapshot.reset();
        self.notice = None;
        self.channel = Some(Channel::open(
            self.connector.clone(),
            &self.endpoint,
            self.retry,
        ));
        self.state = SessionState::Connecting;
        info!(camera_id, threshold, endpoint = %self.endpoint, "session starting");
        true
    }

    /// Tear down the session. Returns `false` if already `Idle`.
    ///
    /// History is kept.
    pub fn stop(&mut self) -> bool {
        if self.state == SessionState::Idle {
            return false;
        }

        if let Some(mut channel) = self.channel.take() {
            if let Some(camera_id) = &self.camera_id {
                let notice = json!({ "camera_id": camera_id });
                if let Err(e) = channel.send(protocol::STOP_STREAM, notice) {
                    debug!(error = %e, "stop notice not sent");
                }
            }
            channel.close();
        }

        self.enter_idle();
        info!(camera_id = ?self.camera_id, "session stopped");
        true
    }

    /// Apply every event already delivered by the channel, without waiting.
    ///
    /// Returns how many events were applied.
    pub fn poll(&mut self) -> usize {
        let mut applied = 0;
        while let Some(event) = self.channel.as_mut().and_then(Channel::try_next_event) {
            self.apply(event);
            applied += 1;
        }
        applied
    }

    /// Wait for the next channel event and apply it.
    ///
    /// Returns `false` when there is no channel to wait on.
    pub async fn next_event(&mut self) -> bool {
        let Some(channel) = self.channel.as_mut() else {
            return false;
        };
        match channel.next_event().await {
            Some(event) => {
                self.apply(event);
                true
            }
            None => {
                self.fail("streaming channel ended unexpectedly".to_string());
                false
            }
        }
    }

    fn apply(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Connected => self.send_handshake(),
            ChannelEvent::Message(envelope) => self.handle_message(envelope),
            ChannelEvent::Disconnected { reason } => {
                warn!(%reason, "stream disconnected");
                if self.state == SessionState::Active {
                    self.state = SessionState::Connecting;
                }
            }
            ChannelEvent::Reconnecting { attempt } => {
                info!(attempt, max = self.retry.max_attempts, "reconnecting");
            }
            ChannelEvent::Failed { message } => self.fail(message),
        }
    }

    fn send_handshake(&mut self) {
        let (Some(channel), Some(camera_id), Some(threshold)) = (
            self.channel.as_ref(),
            self.camera_id.as_ref(),
            self.session_threshold,
        ) else {
            return;
        };

        let handshake = protocol::Handshake {
            camera_id: camera_id.clone(),
            threshold,
        };
        let sent = serde_json::to_value(&handshake)
            .map_err(TransportError::from)
            .and_then(|payload| channel.send(protocol::START_STREAM, payload));
        match sent {
            Ok(()) => info!(%camera_id, threshold, "handshake sent"),
            Err(e) => warn!(error = %e, "failed to send handshake"),
        }
    }

    fn handle_message(&mut self, envelope: Envelope) {
        match Inbound::from_envelope(envelope) {
            Ok(Inbound::Frame(frame)) => self.handle_frame(frame),
            Ok(Inbound::Connected(notice)) => {
                debug!(message = ?notice.message, "backend ready");
            }
            Ok(Inbound::Error(notice)) => self.handle_error(notice),
            Err(Rejected::UnknownEvent(event)) => debug!(%event, "dropping unknown event"),
            Err(Rejected::BadPayload { event, reason }) => {
                debug!(%event, %reason, "dropping malformed payload")
            }
        }
    }

    fn handle_frame(&mut self, frame: FramePayload) {
        if !self.state.is_running() {
            debug!(camera_id = %frame.camera_id, "frame outside a running session");
            return;
        }
        if self.camera_id.as_deref() != Some(frame.camera_id.as_str()) {
            debug!(camera_id = %frame.camera_id, "dropping foreign frame");
            return;
        }

        if self.state == SessionState::Connecting {
            info!(camera_id = %frame.camera_id, "session active");
            self.state = SessionState::Active;
        }

        let now = Utc::now();
        if let Some(reading) = frame.density {
            self.snapshot.reading = reading;
            self.history.append(DensitySample::at(now, reading));
        }
        if let Some(alert) = frame.alert {
            self.snapshot.alert = alert;
        }
        if let Some(image) = frame.frame.as_deref() {
            self.snapshot.frame = Some(FrameInfo::from_base64(image, now));
        }
        self.snapshot.frames_received += 1;
        self.snapshot.updated_at = Some(now);
    }

    fn handle_error(&mut self, notice: NoticePayload) {
        if let Some(other) = notice
            .camera_id
            .as_deref()
            .filter(|id| Some(*id) != self.camera_id.as_deref())
        {
            debug!(camera_id = other, "dropping foreign error");
            return;
        }
        if !self.state.is_running() {
            return;
        }
        let message = notice
            .message
            .unwrap_or_else(|| "stream error reported by backend".to_string());
        self.fail(message);
    }

    fn fail(&mut self, message: String) {
        warn!(%message, camera_id = ?self.camera_id, "session failed");
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.snapshot.reset();
        self.session_threshold = None;
        self.state = SessionState::Error;
        self.notice = Some(message);
    }

    fn enter_idle(&mut self) {
        self.snapshot.reset();
        self.session_threshold = None;
        self.state = SessionState::Idle;
    }

    fn scope_to(&mut self, camera_id: &str) {
        if self.camera_id.as_deref() != Some(camera_id) {
            if self.camera_id.is_some() {
                debug!(from = ?self.camera_id, to = camera_id, "switching camera");
            }
            self.history.clear();
            self.camera_id = Some(camera_id.to_string());
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DensityReading;
    use crate::transport::{BackendPeer, MemoryBackend, MemoryConnector};
    use std::time::Duration;

    fn controller(capacity: usize) -> (SessionController, MemoryConnector, MemoryBackend) {
        let (connector, backend) = MemoryConnector::create();
        let controller = SessionController::new(
            Arc::new(connector.clone()),
            "memory://stream",
            RetryPolicy {
                max_attempts: 5,
                delay: Duration::from_secs(1),
            },
            capacity,
        );
        (controller, connector, backend)
    }

    /// Start for `camera_id`, accept the connection and consume the handshake.
    async fn connect(
        controller: &mut SessionController,
        backend: &mut MemoryBackend,
        camera_id: &str,
        threshold: f64,
    ) -> (BackendPeer, Envelope) {
        assert!(controller.start(camera_id, threshold));
        let mut peer = backend.accept().await.unwrap();
        assert!(controller.next_event().await);
        let handshake = peer.recv().await.unwrap();
        (peer, handshake)
    }

    fn frame(camera_id: &str, person_count: u32) -> serde_json::Value {
        json!({
            "camera_id": camera_id,
            "density": {
                "person_count": person_count,
                "density_value": 0.4,
                "density_per_sqm": 0.8
            },
            "alert": false
        })
    }

    #[tokio::test]
    async fn first_matching_frame_activates_session() {
        let (mut controller, _connector, mut backend) = controller(100);
        let (mut peer, handshake) = connect(&mut controller, &mut backend, "cam-1", 0.65).await;

        assert_eq!(handshake.event, protocol::START_STREAM);
        assert_eq!(handshake.data, json!({"camera_id": "cam-1", "threshold": 0.65}));
        assert_eq!(controller.state(), SessionState::Connecting);

        peer.emit(protocol::FRAME, frame("cam-1", 12)).await.unwrap();
        assert!(controller.next_event().await);

        assert_eq!(controller.state(), SessionState::Active);
        let snapshot = controller.snapshot();
        assert_eq!(
            snapshot.reading,
            DensityReading {
                person_count: 12,
                density_value: 0.4,
                density_per_sqm: 0.8
            }
        );
        assert!(!snapshot.alert);
        assert_eq!(controller.history().len(), 1);
    }

    #[tokio::test]
    async fn foreign_frames_change_nothing() {
        let (mut controller, _connector, mut backend) = controller(100);
        let (mut peer, _) = connect(&mut controller, &mut backend, "cam-1", 0.65).await;
        peer.emit(protocol::FRAME, frame("cam-1", 3)).await.unwrap();
        assert!(controller.next_event().await);

        let state = controller.state();
        let snapshot = controller.snapshot().clone();
        let history = controller.history().snapshot();

        peer.emit(protocol::FRAME, frame("cam-2", 99)).await.unwrap();
        peer.emit(protocol::ERROR, json!({"camera_id": "cam-2", "message": "boom"}))
            .await
            .unwrap();
        assert!(controller.next_event().await);
        assert!(controller.next_event().await);

        assert_eq!(controller.state(), state);
        assert_eq!(controller.snapshot(), &snapshot);
        assert_eq!(controller.history().snapshot(), history);
        assert!(controller.take_notice().is_none());
    }

    #[tokio::test]
    async fn foreign_frame_does_not_activate_connecting_session() {
        let (mut controller, _connector, mut backend) = controller(100);
        let (mut peer, _) = connect(&mut controller, &mut backend, "cam-1", 0.65).await;

        peer.emit(protocol::FRAME, frame("cam-2", 1)).await.unwrap();
        assert!(controller.next_event().await);

        assert_eq!(controller.state(), SessionState::Connecting);
        assert!(controller.history().is_empty());
    }

    #[tokio::test]
    async fn partial_frames_update_only_present_fields() {
        let (mut controller, _connector, mut backend) = controller(100);
        let (mut peer, _) = connect(&mut controller, &mut backend, "cam-1", 0.65).await;

        peer.emit(protocol::FRAME, frame("cam-1", 7)).await.unwrap();
        peer.emit(protocol::FRAME, json!({"camera_id": "cam-1", "alert": true}))
            .await
            .unwrap();
        peer.emit(protocol::FRAME, json!({"camera_id": "cam-1", "frame": "aGVsbG8="}))
            .await
            .unwrap();
        for _ in 0..3 {
            assert!(controller.next_event().await);
        }

        let snapshot = controller.snapshot();
        assert_eq!(snapshot.reading.person_count, 7);
        assert!(snapshot.alert);
        assert_eq!(snapshot.frame.map(|f| f.bytes), Some(5));
        assert_eq!(snapshot.frames_received, 3);
        assert_eq!(controller.history().len(), 1);
    }

    #[tokio::test]
    async fn history_keeps_last_capacity_samples_in_order() {
        let (mut controller, _connector, mut backend) = controller(100);
        let (mut peer, _) = connect(&mut controller, &mut backend, "cam-1", 0.65).await;

        for n in 0..101 {
            peer.emit(protocol::FRAME, frame("cam-1", n)).await.unwrap();
        }
        for _ in 0..101 {
            assert!(controller.next_event().await);
        }

        let counts: Vec<u32> = controller
            .history()
            .snapshot()
            .iter()
            .map(|s| s.person_count)
            .collect();
        assert_eq!(counts, (1..101).collect::<Vec<_>>());

        let projection = controller.projection();
        assert_eq!(projection.len(), 100);
        assert_eq!(projection.density.points.len(), 100);
        assert_eq!(projection.people.points.len(), 100);
    }

    #[tokio::test]
    async fn second_start_does_not_open_another_channel() {
        let (mut controller, connector, mut backend) = controller(100);
        assert!(controller.start("cam-1", 0.65));
        assert!(!controller.start("cam-1", 0.65));
        assert!(!controller.start("cam-2", 0.65));

        let _peer = backend.accept().await.unwrap();
        assert!(controller.next_event().await);
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(connector.attempts(), 1);
        assert!(backend.try_accept().is_none());
        assert_eq!(controller.camera_id(), Some("cam-1"));
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_keeps_history() {
        let (mut controller, _connector, mut backend) = controller(100);
        assert!(!controller.stop());

        let (mut peer, _) = connect(&mut controller, &mut backend, "cam-1", 0.65).await;
        peer.emit(protocol::FRAME, frame("cam-1", 4)).await.unwrap();
        assert!(controller.next_event().await);

        assert!(controller.stop());
        assert!(!controller.stop());
        assert_eq!(controller.state(), SessionState::Idle);
        assert_eq!(controller.snapshot(), &LiveSnapshot::default());
        assert_eq!(controller.history().len(), 1);

        let notice = peer.recv().await.unwrap();
        assert_eq!(notice.event, protocol::STOP_STREAM);
        assert_eq!(notice.data, json!({"camera_id": "cam-1"}));
        assert!(peer.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropping_controller_sends_stop_and_closes() {
        let (mut controller, _connector, mut backend) = controller(100);
        let (mut peer, _) = connect(&mut controller, &mut backend, "cam-1", 0.65).await;

        drop(controller);

        assert_eq!(peer.recv().await.unwrap().event, protocol::STOP_STREAM);
        assert!(peer.recv().await.is_none());
    }

    #[tokio::test]
    async fn threshold_change_applies_only_after_restart() {
        let (mut controller, _connector, mut backend) = controller(100);
        let mut store = ConfigStore::default();
        let (mut peer, handshake) =
            connect(&mut controller, &mut backend, "cam-1", store.threshold()).await;
        assert_eq!(handshake.data["threshold"], 0.65);

        store.set(0.9);
        peer.emit(protocol::FRAME, frame("cam-1", 1)).await.unwrap();
        assert!(controller.next_event().await);
        assert_eq!(controller.session_threshold(), Some(0.65));

        assert!(controller.stop());
        assert_eq!(peer.recv().await.unwrap().event, protocol::STOP_STREAM);

        let (_peer, handshake) =
            connect(&mut controller, &mut backend, "cam-1", store.threshold()).await;
        assert_eq!(handshake.data["threshold"], 0.9);
        // Same camera: history survives the restart.
        assert_eq!(controller.history().len(), 1);
    }

    #[tokio::test]
    async fn stale_channel_is_invisible_after_restart() {
        let (mut controller, _connector, mut backend) = controller(100);
        let (mut old_peer, _) = connect(&mut controller, &mut backend, "cam-1", 0.65).await;

        controller.stop();
        let _ = old_peer.emit(protocol::FRAME, frame("cam-1", 50)).await;

        let (_peer, _) = connect(&mut controller, &mut backend, "cam-1", 0.65).await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(controller.poll(), 0);
        assert!(controller.history().is_empty());
        assert_eq!(controller.state(), SessionState::Connecting);
    }

    #[tokio::test]
    async fn switching_camera_clears_history() {
        let (mut controller, _connector, mut backend) = controller(100);
        controller.seed_history(
            "cam-1",
            vec![DensitySample::at(Utc::now(), DensityReading::default())],
        );
        assert_eq!(controller.history().len(), 1);

        let (_peer, handshake) = connect(&mut controller, &mut backend, "cam-2", 0.5).await;
        assert_eq!(handshake.data["camera_id"], "cam-2");
        assert!(controller.history().is_empty());
    }

    #[tokio::test]
    async fn threshold_is_clamped_in_handshake() {
        let (mut controller, _connector, mut backend) = controller(100);
        let (_peer, handshake) = connect(&mut controller, &mut backend, "cam-1", 1.5).await;
        assert_eq!(handshake.data["threshold"], 1.0);
    }

    #[tokio::test]
    async fn backend_error_for_own_camera_is_terminal() {
        let (mut controller, _connector, mut backend) = controller(100);
        let (mut peer, _) = connect(&mut controller, &mut backend, "cam-1", 0.65).await;
        peer.emit(protocol::FRAME, frame("cam-1", 2)).await.unwrap();
        peer.emit(protocol::ERROR, json!({"message": "Failed to open video stream"}))
            .await
            .unwrap();
        assert!(controller.next_event().await);
        assert!(controller.next_event().await);

        assert_eq!(controller.state(), SessionState::Error);
        assert_eq!(
            controller.take_notice().as_deref(),
            Some("Failed to open video stream")
        );
        assert_eq!(controller.snapshot(), &LiveSnapshot::default());
        assert_eq!(controller.history().len(), 1);
        assert!(!controller.next_event().await);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_start_ends_in_error_without_retrying() {
        let (mut controller, connector, _backend) = controller(100);
        connector.refuse_all();

        assert!(controller.start("cam-1", 0.65));
        while controller.next_event().await {}

        assert_eq!(controller.state(), SessionState::Error);
        assert_eq!(connector.attempts(), 1);
        let notice = controller.take_notice().unwrap();
        assert!(notice.contains("cannot connect"));
        assert!(controller.take_notice().is_none());
        assert_eq!(controller.snapshot(), &LiveSnapshot::default());

        // Error requires an explicit stop before restarting.
        assert!(!controller.start("cam-1", 0.65));
        assert!(controller.stop());
        assert_eq!(controller.state(), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_after_drop_end_in_error() {
        let (mut controller, connector, mut backend) = controller(100);
        let (mut peer, _) = connect(&mut controller, &mut backend, "cam-1", 0.65).await;
        peer.emit(protocol::FRAME, frame("cam-1", 8)).await.unwrap();
        assert!(controller.next_event().await);

        connector.refuse_all();
        drop(peer);
        while controller.next_event().await {}

        assert_eq!(controller.state(), SessionState::Error);
        assert_eq!(connector.attempts(), 6);
        let notice = controller.take_notice().unwrap();
        assert!(notice.contains("gave up"));
        assert_eq!(controller.snapshot(), &LiveSnapshot::default());
        assert_eq!(controller.history().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_drop_reconnects_and_resends_handshake() {
        let (mut controller, _connector, mut backend) = controller(100);
        let (mut peer, _) = connect(&mut controller, &mut backend, "cam-1", 0.7).await;
        peer.emit(protocol::FRAME, frame("cam-1", 5)).await.unwrap();
        assert!(controller.next_event().await);
        drop(peer);

        // Disconnected, then Reconnecting.
        assert!(controller.next_event().await);
        assert_eq!(controller.state(), SessionState::Connecting);
        assert!(controller.next_event().await);

        let mut peer = backend.accept().await.unwrap();
        assert!(controller.next_event().await);
        let handshake = peer.recv().await.unwrap();
        assert_eq!(handshake.data, json!({"camera_id": "cam-1", "threshold": 0.7}));
        assert_eq!(controller.history().len(), 1);
    }
}
