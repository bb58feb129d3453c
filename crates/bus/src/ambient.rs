//! Ambient `request_id` propagation (§3, §4.2: "a `request_id` header is
//! propagated from context if present").
//!
//! A consumer handler's `publish`/`send`/`request` sub-calls don't carry a
//! `HandlerContext` explicitly — they go straight through [`crate::Bus`],
//! which has no per-call context parameter to thread one through. Instead,
//! [`crate::consumer`]'s drain loop sets the inbound message's `request_id`
//! as a task-local for the duration of the handler invocation, and every
//! outbound message construction in `bus.rs` reads it back via
//! [`current`]. This covers handler sub-calls and VM `EBSEND`/`EBPUBLISH`/
//! `EBREQUEST` opcodes alike, since both run as plain `.await`s inside the
//! same task the scope was established on.

use std::future::Future;

tokio::task_local! {
    static REQUEST_ID: Option<String>;
}

/// Runs `fut` with `request_id` set as the ambient value for its duration.
pub(crate) async fn scope<F: Future>(request_id: Option<String>, fut: F) -> F::Output {
    REQUEST_ID.scope(request_id, fut).await
}

/// Reads the ambient request id, or `None` outside any [`scope`].
pub(crate) fn current() -> Option<String> {
    REQUEST_ID.try_with(|id| id.clone()).unwrap_or(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn current_is_none_outside_any_scope() {
        assert_eq!(current(), None);
    }

    #[tokio::test]
    async fn current_reads_back_the_scoped_value() {
        let seen = scope(Some("req-1".to_string()), async { current() }).await;
        assert_eq!(seen, Some("req-1".to_string()));
        assert_eq!(current(), None);
    }
}
