use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

/// Owner of the single background renewal task.
///
/// Installing a new task aborts the previous one, so at most one timer runs.
/// Dropping the owner aborts whatever is running.
#[derive(Default)]
pub(crate) struct AutoRefresh {
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl AutoRefresh {
    pub(crate) fn replace(&self, handle: JoinHandle<()>) {
        if let Some(previous) = self.handle.lock().replace(handle) {
            debug!("Cancelling previous auto-refresh task");
            previous.abort();
        }
    }

    /// Abort the running task. Returns whether there was one.
    pub(crate) fn cancel(&self) -> bool {
        match self.handle.lock().take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for AutoRefresh {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.get_mut().take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    fn idle_task() -> JoinHandle<()> {
        tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
    }

    #[tokio::test]
    async fn test_replace_aborts_previous() {
        let timers = AutoRefresh::default();
        let first = idle_task();
        let first_abort = first.abort_handle();

        timers.replace(first);
        timers.replace(idle_task());
        settle().await;

        assert!(first_abort.is_finished());
        assert!(timers.is_running());
    }

    #[tokio::test]
    async fn test_cancel() {
        let timers = AutoRefresh::default();
        assert!(!timers.cancel());

        timers.replace(idle_task());
        assert!(timers.cancel());
        assert!(!timers.is_running());
    }

    #[tokio::test]
    async fn test_drop_aborts_task() {
        let task = idle_task();
        let abort = task.abort_handle();
        {
            let timers = AutoRefresh::default();
            timers.replace(task);
        }
        settle().await;
        assert!(abort.is_finished());
    }
}
