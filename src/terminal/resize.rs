//! Background terminal size watcher.
//!
//! The watcher thread polls the terminal and publishes changes through a
//! shared lock. The render step holds the read guard while it paints, so it
//! never sees a size that changes halfway through a frame.

use parking_lot::{RwLock, RwLockReadGuard, RwLockUpgradableReadGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size {
    pub width: u16,
    pub height: u16,
}

impl Size {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    /// Rows left for text below the status and message lines
    pub fn text_rows(&self) -> usize {
        (self.height as usize).saturating_sub(2).max(1)
    }
}

pub struct ResizeWatcher {
    size: Arc<RwLock<Size>>,
    resized: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl ResizeWatcher {
    /// Watch the real terminal
    pub fn spawn(initial: Size, poll: Duration) -> Self {
        Self::spawn_with(initial, poll, || {
            crossterm::terminal::size()
                .ok()
                .map(|(width, height)| Size::new(width, height))
        })
    }

    /// Watch sizes reported by `probe`
    pub fn spawn_with(
        initial: Size,
        poll: Duration,
        probe: impl Fn() -> Option<Size> + Send + 'static,
    ) -> Self {
        let size = Arc::new(RwLock::new(initial));
        let resized = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let size = Arc::clone(&size);
            let resized = Arc::clone(&resized);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Acquire) {
                    if let Some(new) = probe() {
                        store(&size, &resized, new);
                    }
                    thread::sleep(poll);
                }
            })
        };

        Self {
            size,
            resized,
            stop,
            handle: Some(handle),
        }
    }

    /// Record a size reported some other way (a resize event)
    pub fn update(&self, new: Size) {
        store(&self.size, &self.resized, new);
    }

    /// Hold the current size for the duration of a frame
    pub fn read(&self) -> RwLockReadGuard<'_, Size> {
        self.size.read()
    }

    /// True once after each change
    pub fn take_resized(&self) -> bool {
        self.resized.swap(false, Ordering::AcqRel)
    }
}

fn store(size: &RwLock<Size>, resized: &AtomicBool, new: Size) {
    let current = size.upgradable_read();
    if *current != new {
        tracing::debug!(width = new.width, height = new.height, "terminal resized");
        *RwLockUpgradableReadGuard::upgrade(current) = new;
        resized.store(true, Ordering::Release);
    }
}

impl Drop for ResizeWatcher {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_watcher_reports_changes_once() {
        let reported = Arc::new(RwLock::new(Size::new(80, 24)));
        let probe = {
            let reported = Arc::clone(&reported);
            move || Some(*reported.read())
        };
        let watcher = ResizeWatcher::spawn_with(Size::new(80, 24), Duration::from_millis(5), probe);
        assert!(!watcher.take_resized());

        *reported.write() = Size::new(100, 40);
        let deadline = Instant::now() + Duration::from_secs(5);
        while !watcher.take_resized() {
            assert!(Instant::now() < deadline, "resize never observed");
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(*watcher.read(), Size::new(100, 40));
        assert!(!watcher.take_resized());
    }

    #[test]
    fn test_update_and_text_rows() {
        let watcher = ResizeWatcher::spawn_with(Size::new(80, 24), Duration::from_millis(5), || None);
        watcher.update(Size::new(80, 24));
        assert!(!watcher.take_resized());
        watcher.update(Size::new(80, 10));
        assert!(watcher.take_resized());
        assert_eq!(watcher.read().text_rows(), 8);
        assert_eq!(Size::new(10, 1).text_rows(), 1);
    }
}
