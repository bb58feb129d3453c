//! Unit of work submitted to an [`crate::Executor`] (§4.1).

use std::future::Future;
use std::pin::Pin;

/// Outcome of running a [`Task`]'s future to completion. `Executor` itself
/// handles panics (via task-spawn isolation); this is the result the body
/// chooses to report.
pub type TaskOutcome = Result<(), crate::ExecError>;

/// A named, boxed unit of work. The name is carried through into tracing
/// spans so a worker's logs identify which task ran.
pub struct Task {
    pub(crate) name: String,
    pub(crate) fut: Pin<Box<dyn Future<Output = TaskOutcome> + Send + 'static>>,
}

impl Task {
    pub fn new<F>(name: impl Into<String>, fut: F) -> Self
    where
        F: Future<Output = TaskOutcome> + Send + 'static,
    {
        Self {
            name: name.into(),
            fut: Box::pin(fut),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").field("name", &self.name).finish()
    }
}
