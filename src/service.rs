pub mod auction_house;
pub mod session;
pub mod ui;

pub use self::{auction_house::*, session::*, ui::*};

use std::future::Future;

/// Background task handle that cancels the task on drop
///
/// Every timer and loop of a session is owned by one of these, so tearing
/// the owner down is enough to stop everything it started.
#[derive(Debug)]
pub struct TaskHandle<T = ()> {
    task: Option<tokio::task::JoinHandle<T>>,
}

impl<T> TaskHandle<T>
where
    T: Send + 'static,
{
    /// Must be called from within a tokio runtime
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        Self {
            task: Some(tokio::spawn(future)),
        }
    }
}

impl<T> TaskHandle<T> {
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map(|t| t.is_finished()).unwrap_or(true)
    }

    /// Wait for the task to finish on its own
    pub async fn join(mut self) -> anyhow::Result<T> {
        match self.task.take() {
            Some(task) => Ok(task.await?),
            None => Err(anyhow::format_err!("task already joined")),
        }
    }
}

impl<T> Drop for TaskHandle<T> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
