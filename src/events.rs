use std::time::Duration;

use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use crate::app::App;
use crate::session::THRESHOLD_STEP;

/// Poll for events with a timeout
pub fn poll_event(timeout: Duration) -> Result<Option<Event>> {
    if event::poll(timeout)? {
        Ok(Some(event::read()?))
    } else {
        Ok(None)
    }
}

/// Handle a key event
pub fn handle_key_event(app: &mut App, key: KeyEvent) {
    if key.kind == KeyEventKind::Release {
        return;
    }

    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.quit();
        return;
    }

    // If help is shown, any key closes it
    if app.show_help {
        app.show_help = false;
        return;
    }

    if app.settings_draft.is_some() {
        handle_settings_input(app, key);
        return;
    }

    match key.code {
        KeyCode::Char('q') => app.quit(),

        KeyCode::Char('s') | KeyCode::Char(' ') => app.toggle_stream(),
        KeyCode::Char('t') => app.open_settings(),
        KeyCode::Char('c') => app.clear_history(),
        KeyCode::Char('?') => app.toggle_help(),

        _ => {}
    }
}

/// Handle key input while the settings overlay is open
fn handle_settings_input(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Left | KeyCode::Char('h') | KeyCode::Down | KeyCode::Char('-') => {
            app.nudge_threshold(-THRESHOLD_STEP)
        }
        KeyCode::Right | KeyCode::Char('l') | KeyCode::Up | KeyCode::Char('+') => {
            app.nudge_threshold(THRESHOLD_STEP)
        }
        KeyCode::Enter => app.save_settings(),
        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('t') => app.close_settings(),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::CameraRef;
    use crate::session::{ConfigStore, SessionController, SessionState};
    use crate::transport::{MemoryConnector, RetryPolicy};
    use crate::ui::Theme;
    use std::sync::Arc;

    fn app() -> App {
        let (connector, _backend) = MemoryConnector::create();
        let controller = SessionController::new(
            Arc::new(connector),
            "memory://stream",
            RetryPolicy::default(),
            10,
        );
        let camera = CameraRef {
            id: "cam-1".to_string(),
            name: "Gate".to_string(),
            location: "North".to_string(),
        };
        App::new(camera, controller, ConfigStore::default(), Theme::dark())
    }

    fn press(app: &mut App, code: KeyCode) {
        handle_key_event(app, KeyEvent::new(code, KeyModifiers::NONE));
    }

    #[test]
    fn help_swallows_next_key() {
        let mut app = app();
        press(&mut app, KeyCode::Char('?'));
        assert!(app.show_help);

        press(&mut app, KeyCode::Char('q'));
        assert!(!app.show_help);
        assert!(app.running);
    }

    #[test]
    fn settings_keys_adjust_and_save() {
        let mut app = app();
        press(&mut app, KeyCode::Char('t'));
        assert!(app.settings_draft.is_some());

        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Char('l'));
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Enter);

        assert!(app.settings_draft.is_none());
        assert!((app.config.threshold() - 0.70).abs() < 1e-9);
    }

    #[test]
    fn escape_leaves_threshold_untouched() {
        let mut app = app();
        press(&mut app, KeyCode::Char('t'));
        press(&mut app, KeyCode::Right);
        press(&mut app, KeyCode::Esc);

        assert!(app.settings_draft.is_none());
        assert_eq!(app.config.threshold(), 0.65);
    }

    #[test]
    fn q_inside_settings_only_closes_overlay() {
        let mut app = app();
        press(&mut app, KeyCode::Char('t'));
        press(&mut app, KeyCode::Char('q'));
        assert!(app.running);
        assert!(app.settings_draft.is_none());
    }

    #[tokio::test]
    async fn space_toggles_stream_and_q_quits() {
        let mut app = app();
        press(&mut app, KeyCode::Char(' '));
        assert_eq!(app.state(), SessionState::Connecting);

        press(&mut app, KeyCode::Char('q'));
        assert!(!app.running);
        assert_eq!(app.state(), SessionState::Idle);
    }

    #[test]
    fn ctrl_c_quits_from_anywhere() {
        let mut app = app();
        press(&mut app, KeyCode::Char('t'));
        handle_key_event(
            &mut app,
            KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL),
        );
        assert!(!app.running);
    }
}
