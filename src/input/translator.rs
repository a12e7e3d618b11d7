//! Input Translator
//!
//! Turns decoded terminal events into synthetic commands for the display,
//! applying the session's mouse mode and the cell-to-pixel mapping.

use tokio::time::Instant;
use tracing::debug;

use super::event::InputEvent;
use super::hold::KeyHoldTracker;
use crate::backend::SyntheticCommand;
use crate::session::{MouseMode, SessionState};

/// Per-session translator
#[derive(Debug, Clone)]
pub struct InputTranslator {
    holds: KeyHoldTracker,
}

impl InputTranslator {
    pub fn new(holds: KeyHoldTracker) -> Self {
        Self { holds }
    }

    pub fn holds(&self) -> &KeyHoldTracker {
        &self.holds
    }

    pub fn holds_mut(&mut self) -> &mut KeyHoldTracker {
        &mut self.holds
    }

    /// Translate one event, updating `session` along the way
    pub fn translate(
        &mut self,
        event: InputEvent,
        session: &mut SessionState,
    ) -> Option<SyntheticCommand> {
        self.translate_at(event, session, Instant::now())
    }

    /// Same as `translate`, with an explicit time for hold deadlines
    pub fn translate_at(
        &mut self,
        event: InputEvent,
        session: &mut SessionState,
        now: Instant,
    ) -> Option<SyntheticCommand> {
        match event {
            InputEvent::ToggleMouseMode => {
                session.mouse_mode = session.mouse_mode.toggled();
                debug!(session = %session.id, mode = %session.mouse_mode, "Mouse mode toggled");
                None
            }
            InputEvent::PointerMove { col, row } => {
                let (x, y) = session.geometry.cell_to_display(col, row);
                let previous = session.last_known_position.replace((x, y));
                match session.mouse_mode {
                    MouseMode::Absolute => Some(SyntheticCommand::MoveAbsolute { x, y }),
                    MouseMode::Relative => {
                        let (px, py) = previous?;
                        let scale = session.relative_sensitivity;
                        let (dx, dy) = ((x - px) * scale, (y - py) * scale);
                        if dx == 0 && dy == 0 {
                            None
                        } else {
                            Some(SyntheticCommand::MoveRelative { dx, dy })
                        }
                    }
                }
            }
            InputEvent::ButtonPress(button) => Some(SyntheticCommand::ButtonDown(button)),
            InputEvent::ButtonRelease(button) => Some(SyntheticCommand::ButtonUp(button)),
            InputEvent::ScrollDelta(amount) if amount != 0 => Some(SyntheticCommand::Scroll(amount)),
            InputEvent::ScrollDelta(_) => None,
            InputEvent::KeyPress(stroke) => {
                if self.holds.is_hold_key(&stroke) {
                    self.holds
                        .press(&stroke.key, now)
                        .then_some(SyntheticCommand::KeyDown(stroke))
                } else {
                    Some(SyntheticCommand::KeyTap(stroke))
                }
            }
            InputEvent::KeyRelease(stroke) => Some(SyntheticCommand::KeyUp(stroke)),
            InputEvent::Resize(_) | InputEvent::Interrupt => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::backend::DisplayHandle;
    use crate::core::{Geometry, GridSize};
    use crate::input::{KeyCode, KeyStroke, MouseButton};
    use crate::session::SessionId;

    fn translator() -> InputTranslator {
        InputTranslator::new(KeyHoldTracker::new(['w', 'a', 's', 'd'], Duration::from_millis(100)))
    }

    fn session(mode: MouseMode) -> SessionState {
        let display = DisplayHandle::new(":1", 1280, 720);
        SessionState::new(SessionId::new("test"), display, mode)
            .with_geometry(Geometry::new(GridSize::new(80, 24), 1280, 720))
    }

    #[test]
    fn test_absolute_mapping() {
        let mut translator = translator();
        let mut state = session(MouseMode::Absolute);
        let command = translator.translate(InputEvent::PointerMove { col: 40, row: 12 }, &mut state);
        assert_eq!(command, Some(SyntheticCommand::MoveAbsolute { x: 640, y: 360 }));
        assert_eq!(state.last_known_position, Some((640, 360)));
    }

    #[test]
    fn test_relative_mapping() {
        let mut translator = translator();
        let mut state = session(MouseMode::Relative);

        assert_eq!(translator.translate(InputEvent::PointerMove { col: 10, row: 10 }, &mut state), None);
        assert_eq!(translator.translate(InputEvent::PointerMove { col: 10, row: 10 }, &mut state), None);
        assert_eq!(
            translator.translate(InputEvent::PointerMove { col: 11, row: 9 }, &mut state),
            Some(SyntheticCommand::MoveRelative { dx: 80, dy: -150 })
        );
    }

    #[test]
    fn test_toggle_twice_emits_nothing() {
        let mut translator = translator();
        let mut state = session(MouseMode::Absolute);
        assert_eq!(translator.translate(InputEvent::ToggleMouseMode, &mut state), None);
        assert_eq!(state.mouse_mode, MouseMode::Relative);
        assert_eq!(translator.translate(InputEvent::ToggleMouseMode, &mut state), None);
        assert_eq!(state.mouse_mode, MouseMode::Absolute);
    }

    #[test]
    fn test_position_tracked_across_toggle() {
        let mut translator = translator();
        let mut state = session(MouseMode::Absolute);
        translator.translate(InputEvent::PointerMove { col: 0, row: 0 }, &mut state);
        translator.translate(InputEvent::ToggleMouseMode, &mut state);
        assert_eq!(
            translator.translate(InputEvent::PointerMove { col: 1, row: 0 }, &mut state),
            Some(SyntheticCommand::MoveRelative { dx: 80, dy: 0 })
        );
    }

    #[test]
    fn test_buttons_scroll_and_keys() {
        let mut translator = translator();
        let mut state = session(MouseMode::Absolute);
        let mut translate = |event| translator.translate(event, &mut state);

        assert_eq!(
            translate(InputEvent::ButtonPress(MouseButton::Left)),
            Some(SyntheticCommand::ButtonDown(MouseButton::Left))
        );
        assert_eq!(
            translate(InputEvent::ButtonRelease(MouseButton::Right)),
            Some(SyntheticCommand::ButtonUp(MouseButton::Right))
        );
        assert_eq!(translate(InputEvent::ScrollDelta(-1)), Some(SyntheticCommand::Scroll(-1)));
        assert_eq!(
            translate(InputEvent::KeyPress(KeyStroke::plain(KeyCode::Enter))),
            Some(SyntheticCommand::KeyTap(KeyStroke::plain(KeyCode::Enter)))
        );
        assert_eq!(
            translate(InputEvent::KeyPress(KeyStroke::plain(KeyCode::Unknown(b"\x1b[99~".to_vec())))),
            Some(SyntheticCommand::KeyTap(KeyStroke::plain(KeyCode::Unknown(b"\x1b[99~".to_vec()))))
        );
        assert_eq!(translate(InputEvent::Interrupt), None);
        assert_eq!(translate(InputEvent::Resize(GridSize::new(100, 40))), None);
    }

    #[test]
    fn test_hold_key_down_once_then_up() {
        let mut translator = translator();
        let mut state = session(MouseMode::Absolute);
        let start = Instant::now();
        let w = || InputEvent::KeyPress(KeyStroke::char('w'));

        assert_eq!(
            translator.translate_at(w(), &mut state, start),
            Some(SyntheticCommand::KeyDown(KeyStroke::char('w')))
        );
        assert_eq!(
            translator.translate_at(w(), &mut state, start + Duration::from_millis(30)),
            None
        );

        let released = translator
            .holds_mut()
            .expired(start + Duration::from_millis(130));
        assert_eq!(released.len(), 1);
        let release = released.into_iter().next().unwrap();
        assert_eq!(
            translator.translate(release, &mut state),
            Some(SyntheticCommand::KeyUp(KeyStroke::char('w')))
        );
    }
}
