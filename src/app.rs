//! Application state and user actions for the monitoring view.

use std::time::{Duration, Instant};

use crate::data::CameraRef;
use crate::session::{ConfigStore, SessionController, SessionState};
use crate::ui::Theme;

/// How long a status message stays visible.
const STATUS_MESSAGE_TTL: Duration = Duration::from_secs(5);

/// Main application state.
pub struct App {
    pub running: bool,
    pub show_help: bool,
    /// Threshold being edited while the settings overlay is open.
    pub settings_draft: Option<ConfigStore>,

    pub camera: CameraRef,
    pub controller: SessionController,
    pub config: ConfigStore,

    // UI
    pub theme: Theme,

    // Status message (temporary feedback)
    pub status_message: Option<(String, Instant)>,
}

impl App {
    /// Create the view for `camera`. No session is started.
    pub fn new(
        camera: CameraRef,
        controller: SessionController,
        config: ConfigStore,
        theme: Theme,
    ) -> Self {
        Self {
            running: true,
            show_help: false,
            settings_draft: None,
            camera,
            controller,
            config,
            theme,
            status_message: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.controller.state()
    }

    /// Set a temporary status message that will be shown for a few seconds.
    pub fn set_status_message(&mut self, message: String) {
        self.status_message = Some((message, Instant::now()));
    }

    /// Get the current status message if it hasn't expired.
    pub fn get_status_message(&self) -> Option<&str> {
        if let Some((msg, time)) = &self.status_message {
            if time.elapsed() < STATUS_MESSAGE_TTL {
                return Some(msg);
            }
        }
        None
    }

    /// Apply pending channel events and surface failures.
    pub fn tick(&mut self) -> usize {
        let applied = self.controller.poll();
        if let Some(notice) = self.controller.take_notice() {
            self.set_status_message(format!("Stream error: {notice}"));
        }
        applied
    }

    /// Start the stream if it is not running, stop it otherwise.
    pub fn toggle_stream(&mut self) {
        if self.controller.is_running() {
            self.controller.stop();
            self.set_status_message("Stream stopped".to_string());
            return;
        }

        // Leave Error before restarting.
        self.controller.stop();
        if self.controller.start(&self.camera.id, self.config.threshold()) {
            self.set_status_message(format!(
                "Connecting to {}...",
                self.controller.endpoint()
            ));
        }
    }

    pub fn open_settings(&mut self) {
        self.settings_draft = Some(self.config);
    }

    pub fn close_settings(&mut self) {
        self.settings_draft = None;
    }

    /// Move the draft threshold by `delta`.
    pub fn nudge_threshold(&mut self, delta: f64) {
        if let Some(draft) = self.settings_draft.as_mut() {
            draft.nudge(delta);
        }
    }

    /// Commit the draft. A running session is restarted so the backend
    /// receives the new threshold.
    pub fn save_settings(&mut self) {
        let Some(draft) = self.settings_draft.take() else {
            return;
        };
        let threshold = self.config.set(draft.threshold());

        if self.controller.is_running() {
            self.controller.stop();
            self.controller.start(&self.camera.id, threshold);
            self.set_status_message(format!(
                "Threshold set to {:.0}%, stream restarted",
                threshold * 100.0
            ));
        } else {
            self.set_status_message(format!("Threshold set to {:.0}%", threshold * 100.0));
        }
    }

    pub fn clear_history(&mut self) {
        self.controller.clear_history();
        self.set_status_message("History cleared".to_string());
    }

    /// Toggle the help overlay visibility.
    pub fn toggle_help(&mut self) {
        self.show_help = !self.show_help;
    }

    /// Stop the session and exit the main loop.
    pub fn quit(&mut self) {
        self.controller.stop();
        self.running = false;
    }
}
