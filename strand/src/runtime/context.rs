use super::{EventLoop, Handle};
use crate::error::Result;

use std::cell::{OnceCell, RefCell};

thread_local! {
    /// Handle of the loop currently running on this thread.
    ///
    /// Set while [`EventLoop::run`] or [`EventLoop::block_on`] drives the
    /// loop, so code running inside tasks can reach it without passing a
    /// handle around.
    pub(crate) static CURRENT: RefCell<Option<Handle>> = const { RefCell::new(None) };

    /// Lazily created per-thread default loop.
    static DEFAULT: OnceCell<EventLoop> = const { OnceCell::new() };
}

/// Installs `handle` as the current loop for the duration of `f`.
///
/// The previous value is restored afterwards, including when `f` panics.
pub(crate) fn enter_context<R>(handle: Handle, f: impl FnOnce() -> R) -> R {
    struct Restore(Option<Handle>);

    impl Drop for Restore {
        fn drop(&mut self) {
            let previous = self.0.take();
            CURRENT.with(|current| current.replace(previous));
        }
    }

    let previous = CURRENT.with(|current| current.replace(Some(handle)));
    let _restore = Restore(previous);

    f()
}

/// Returns the loop currently running on this thread, if any.
pub(crate) fn current() -> Option<Handle> {
    CURRENT.with(|current| current.borrow().clone())
}

/// Returns a handle to this thread's default loop, creating it on first
/// use.
///
/// The default loop lives until the thread exits. Drive it with
/// [`run_default_loop`].
pub fn default_loop() -> Result<Handle> {
    DEFAULT.with(|cell| {
        if let Some(event_loop) = cell.get() {
            return Ok(event_loop.handle());
        }

        let event_loop = EventLoop::new()?;
        let handle = event_loop.handle();
        let _ = cell.set(event_loop);

        Ok(handle)
    })
}

/// Runs this thread's default loop until it has no more work.
pub fn run_default_loop() -> Result<()> {
    default_loop()?;

    DEFAULT.with(|cell| match cell.get() {
        Some(event_loop) => event_loop.run(),
        None => Ok(()),
    })
}
