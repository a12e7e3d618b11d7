//! Key-hold emulation
//!
//! Terminals report a held key as a stream of repeated presses and never
//! report the release. For keys where holding matters (movement keys in a
//! game) the first press becomes a key-down, repeats keep it held, and the
//! key is released once no repeat has arrived for the hold window.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use tokio::time::Instant;

use super::event::{InputEvent, KeyCode, KeyStroke};

/// Tracks which hold keys are currently down and when they lapse
#[derive(Debug, Clone)]
pub struct KeyHoldTracker {
    hold_keys: HashSet<char>,
    hold_for: Duration,
    deadlines: HashMap<KeyCode, Instant>,
}

impl KeyHoldTracker {
    pub fn new(hold_keys: impl IntoIterator<Item = char>, hold_for: Duration) -> Self {
        Self {
            hold_keys: hold_keys.into_iter().collect(),
            hold_for,
            deadlines: HashMap::new(),
        }
    }

    /// Whether `stroke` is one of the keys emulated as held
    pub fn is_hold_key(&self, stroke: &KeyStroke) -> bool {
        match stroke.key {
            KeyCode::Char(c) => {
                !stroke.modifiers.ctrl && !stroke.modifiers.alt && self.hold_keys.contains(&c)
            }
            _ => false,
        }
    }

    /// Record a press at `now`. Returns `true` when the key went down,
    /// `false` for a repeat of a key already held.
    pub fn press(&mut self, key: &KeyCode, now: Instant) -> bool {
        self.deadlines
            .insert(key.clone(), now + self.hold_for)
            .is_none()
    }

    /// When the next held key lapses, if any is held
    pub fn next_release(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Release every key whose hold window ended at or before `now`
    pub fn expired(&mut self, now: Instant) -> Vec<InputEvent> {
        let mut lapsed: Vec<(Instant, KeyCode)> = self
            .deadlines
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(key, deadline)| (*deadline, key.clone()))
            .collect();
        lapsed.sort_by_key(|(deadline, _)| *deadline);

        lapsed
            .into_iter()
            .map(|(_, key)| {
                self.deadlines.remove(&key);
                InputEvent::KeyRelease(KeyStroke::plain(key))
            })
            .collect()
    }

    /// Release everything still held
    pub fn release_all(&mut self) -> Vec<InputEvent> {
        let mut held: Vec<(Instant, KeyCode)> =
            self.deadlines.drain().map(|(key, deadline)| (deadline, key)).collect();
        held.sort_by_key(|(deadline, _)| *deadline);
        held.into_iter()
            .map(|(_, key)| InputEvent::KeyRelease(KeyStroke::plain(key)))
            .collect()
    }
}
