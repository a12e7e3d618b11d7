//! Display pool
//!
//! Fixed set of virtual displays, each slot counting the sessions bound to
//! it. Slots are addressed by index; handles carry their slot index back on
//! release. Each slot also remembers the identity that last used it, so a
//! returning viewer can get its display back.

use crate::backend::DisplayHandle;

#[derive(Debug)]
struct Slot {
    display: DisplayHandle,
    sessions: usize,
    last_identity: Option<String>,
}

#[derive(Debug)]
pub struct DisplayPool {
    slots: Vec<Slot>,
    share: bool,
}

impl DisplayPool {
    /// Build a pool over `displays`. With `share` set, a busy pool hands out
    /// the least loaded display instead of refusing.
    pub fn new(displays: impl IntoIterator<Item = DisplayHandle>, share: bool) -> Self {
        let slots = displays
            .into_iter()
            .enumerate()
            .map(|(index, mut display)| {
                display.index = index;
                Slot {
                    display,
                    sessions: 0,
                    last_identity: None,
                }
            })
            .collect();
        Self { slots, share }
    }

    /// Take a display: `preferred` if it is free, else the lowest free slot,
    /// else (when sharing) the least loaded one.
    pub fn acquire(&mut self, preferred: Option<usize>) -> Option<DisplayHandle> {
        let free = |slot: &Slot| slot.sessions == 0;

        let index = preferred
            .filter(|&i| self.slots.get(i).map_or(false, free))
            .or_else(|| self.slots.iter().position(free))
            .or_else(|| {
                if !self.share {
                    return None;
                }
                self.slots
                    .iter()
                    .enumerate()
                    .min_by_key(|(i, slot)| (slot.sessions, *i))
                    .map(|(i, _)| i)
            })?;

        let slot = &mut self.slots[index];
        slot.sessions += 1;
        Some(slot.display.clone())
    }

    /// Return one session's hold on slot `index`
    pub fn release(&mut self, index: usize) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.sessions = slot.sessions.saturating_sub(1);
        }
    }

    /// Sessions currently bound to slot `index`
    pub fn sessions_on(&self, index: usize) -> usize {
        self.slots.get(index).map_or(0, |slot| slot.sessions)
    }

    /// Slot `identity` was last bound to, unless someone else used it since
    pub fn slot_for(&self, identity: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.last_identity.as_deref() == Some(identity))
    }

    /// Record that `identity` is now using slot `index`
    pub fn remember(&mut self, index: usize, identity: &str) {
        if index >= self.slots.len() {
            return;
        }
        for slot in &mut self.slots {
            if slot.last_identity.as_deref() == Some(identity) {
                slot.last_identity = None;
            }
        }
        self.slots[index].last_identity = Some(identity.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn displays(n: usize) -> Vec<DisplayHandle> {
        (1..=n)
            .map(|i| DisplayHandle::new(format!(":{i}"), 640, 480))
            .collect()
    }

    #[test]
    fn test_lowest_free_slot_first() {
        let mut pool = DisplayPool::new(displays(3), false);
        assert_eq!(pool.acquire(None).unwrap().name, ":1");
        assert_eq!(pool.acquire(None).unwrap().name, ":2");
        pool.release(0);
        assert_eq!(pool.acquire(None).unwrap().index, 0);
    }

    #[test]
    fn test_preferred_slot() {
        let mut pool = DisplayPool::new(displays(3), false);
        assert_eq!(pool.acquire(Some(2)).unwrap().name, ":3");
        // taken, so the lowest free one is used
        assert_eq!(pool.acquire(Some(2)).unwrap().name, ":1");
        // out of range is ignored
        assert_eq!(pool.acquire(Some(9)).unwrap().name, ":2");
    }

    #[test]
    fn test_exhaustion_without_sharing() {
        let mut pool = DisplayPool::new(displays(1), false);
        assert!(pool.acquire(None).is_some());
        assert!(pool.acquire(None).is_none());
        assert_eq!(pool.sessions_on(0), 1);
    }

    #[test]
    fn test_slot_remembers_last_identity() {
        let mut pool = DisplayPool::new(displays(3), false);
        pool.remember(1, "alice");
        assert_eq!(pool.slot_for("alice"), Some(1));

        // moving to another slot forgets the old one
        pool.remember(2, "alice");
        assert_eq!(pool.slot_for("alice"), Some(2));

        // a different viewer on the slot takes it over
        pool.remember(2, "bob");
        assert_eq!(pool.slot_for("alice"), None);
        assert_eq!(pool.slot_for("bob"), Some(2));

        pool.remember(7, "carol");
        assert_eq!(pool.slot_for("carol"), None);
    }

    #[test]
    fn test_sharing_picks_least_loaded() {
        let mut pool = DisplayPool::new(displays(2), true);
        pool.acquire(None);
        pool.acquire(None);
        assert_eq!(pool.acquire(None).unwrap().index, 0);
        assert_eq!(pool.acquire(None).unwrap().index, 1);
        assert_eq!(pool.sessions_on(0), 2);

        pool.release(0);
        pool.release(0);
        pool.release(0);
        assert_eq!(pool.sessions_on(0), 0);
    }
}
