//! Delayed busy indicator.
//!
//! Every network operation holds an [`ActivityGuard`] while it runs. The
//! surface only turns busy once work has been outstanding for longer than
//! the configured delay, so quick operations never flash it.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::trace;

/// Whatever displays the busy state.
pub trait BusySurface: Send + Sync {
    fn set_busy(&self, busy: bool);
}

/// A surface that shows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSurface;

impl BusySurface for NoopSurface {
    fn set_busy(&self, _busy: bool) {}
}

#[derive(Default)]
struct State {
    outstanding: usize,
    visible: bool,
    /// Bumped whenever the timer is armed or cancelled; a firing timer with
    /// an older epoch does nothing.
    epoch: u64,
    timer: Option<JoinHandle<()>>,
}

struct Inner {
    delay: Duration,
    surface: Arc<dyn BusySurface>,
    state: Mutex<State>,
    /// Held across a transition and its surface call, so calls reach the
    /// surface in transition order while `state` stays free for readers.
    notify: Mutex<()>,
}

#[derive(Clone)]
pub struct ActivityIndicator {
    inner: Arc<Inner>,
}

impl ActivityIndicator {
    pub fn new(delay: Duration, surface: Arc<dyn BusySurface>) -> Self {
        Self {
            inner: Arc::new(Inner {
                delay,
                surface,
                state: Mutex::new(State::default()),
                notify: Mutex::new(()),
            }),
        }
    }

    /// Count one more outstanding operation until the guard is dropped.
    pub fn acquire(&self) -> ActivityGuard {
        let mut state = self.inner.state.lock();
        state.outstanding += 1;
        if state.outstanding == 1 {
            self.arm(&mut state);
        }
        ActivityGuard {
            indicator: self.clone(),
        }
    }

    pub fn outstanding(&self) -> usize {
        self.inner.state.lock().outstanding
    }

    pub fn is_visible(&self) -> bool {
        self.inner.state.lock().visible
    }

    fn arm(&self, state: &mut State) {
        state.epoch += 1;
        let epoch = state.epoch;
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            trace!("No runtime for busy timer, indicator stays hidden");
            return;
        };

        let inner = Arc::downgrade(&self.inner);
        let delay = self.inner.delay;
        state.timer = Some(handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let _notify = inner.notify.lock();
            let show = {
                let mut state = inner.state.lock();
                let show = state.epoch == epoch && state.outstanding > 0 && !state.visible;
                if show {
                    state.visible = true;
                    state.timer = None;
                }
                show
            };
            if show {
                inner.surface.set_busy(true);
            }
        }));
    }

    fn release(&self) {
        let _notify = self.inner.notify.lock();
        let hide = {
            let mut state = self.inner.state.lock();
            state.outstanding = state.outstanding.saturating_sub(1);
            if state.outstanding > 0 {
                return;
            }
            state.epoch += 1;
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
            std::mem::replace(&mut state.visible, false)
        };
        if hide {
            self.inner.surface.set_busy(false);
        }
    }
}

/// Releases its slot on drop, on every exit path.
#[must_use = "the operation counts as finished as soon as the guard is dropped"]
pub struct ActivityGuard {
    indicator: ActivityIndicator,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.indicator.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[derive(Default)]
    struct RecordingSurface {
        calls: Mutex<Vec<bool>>,
    }

    impl BusySurface for RecordingSurface {
        fn set_busy(&self, busy: bool) {
            self.calls.lock().push(busy);
        }
    }

    fn setup() -> (ActivityIndicator, Arc<RecordingSurface>) {
        let surface = Arc::new(RecordingSurface::default());
        let indicator = ActivityIndicator::new(Duration::from_millis(300), surface.clone());
        (indicator, surface)
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_operation_never_shows() {
        let (indicator, surface) = setup();

        let guard = indicator.acquire();
        sleep(Duration::from_millis(100)).await;
        drop(guard);
        sleep(Duration::from_secs(1)).await;

        assert!(surface.calls.lock().is_empty());
        assert_eq!(indicator.outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_operation_shows_then_hides() {
        let (indicator, surface) = setup();

        let guard = indicator.acquire();
        sleep(Duration::from_millis(299)).await;
        assert!(!indicator.is_visible());
        sleep(Duration::from_millis(2)).await;
        assert!(indicator.is_visible());

        drop(guard);
        assert!(!indicator.is_visible());
        assert_eq!(*surface.calls.lock(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_operations_share_one_cycle() {
        let (indicator, surface) = setup();

        let first = indicator.acquire();
        sleep(Duration::from_millis(200)).await;
        let second = indicator.acquire();
        sleep(Duration::from_millis(200)).await;
        assert!(indicator.is_visible());

        drop(first);
        assert!(indicator.is_visible());
        drop(second);
        assert!(!indicator.is_visible());
        assert_eq!(*surface.calls.lock(), vec![true, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rearm_restarts_delay() {
        let (indicator, surface) = setup();

        drop(indicator.acquire());
        sleep(Duration::from_millis(200)).await;
        let guard = indicator.acquire();
        // The first timer would have fired at 300ms
        sleep(Duration::from_millis(150)).await;
        assert!(!indicator.is_visible());
        sleep(Duration::from_millis(200)).await;
        assert!(indicator.is_visible());
        drop(guard);
        assert_eq!(*surface.calls.lock(), vec![true, false]);
    }

    /// Reads the indicator back from inside each notification.
    struct ReadBackSurface {
        indicator: Mutex<Option<ActivityIndicator>>,
        seen: Mutex<Vec<(bool, bool)>>,
    }

    impl BusySurface for ReadBackSurface {
        fn set_busy(&self, busy: bool) {
            let visible = self
                .indicator
                .lock()
                .as_ref()
                .map(|indicator| indicator.is_visible());
            self.seen.lock().push((busy, visible.unwrap_or(busy)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_surface_can_query_indicator() {
        let surface = Arc::new(ReadBackSurface {
            indicator: Mutex::new(None),
            seen: Mutex::new(Vec::new()),
        });
        let indicator = ActivityIndicator::new(Duration::from_millis(300), surface.clone());
        *surface.indicator.lock() = Some(indicator.clone());

        let guard = indicator.acquire();
        sleep(Duration::from_millis(400)).await;
        drop(guard);

        assert_eq!(*surface.seen.lock(), vec![(true, true), (false, false)]);
        surface.indicator.lock().take();
    }

    #[test]
    fn test_without_runtime_only_counts() {
        let (indicator, surface) = setup();
        let guard = indicator.acquire();
        assert_eq!(indicator.outstanding(), 1);
        drop(guard);
        assert_eq!(indicator.outstanding(), 0);
        assert!(surface.calls.lock().is_empty());
    }
}
