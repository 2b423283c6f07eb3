//! Per-request logging context
//!
//! The log MDC is thread-local, while a request's future may be polled on
//! any worker thread and interleaved with other requests on the same one.
//! The context is therefore published only for the duration of a single
//! synchronous section or poll, and whatever was there before is put back.

use std::future::Future;

use futures::future::poll_fn;
use uuid::Uuid;

const MDC_KEYS: [&str; 3] = ["request", "artifact", "technique"];

/// Identifies one processing request in the logs
#[derive(Debug, Clone, PartialEq)]
pub struct RequestContext {
    pub request_id: String,
    /// Artifact name as submitted by the client
    pub artifact: String,
    pub technique: &'static str,
}

impl RequestContext {
    pub fn new(artifact: &str, technique: &'static str) -> Self {
        Self {
            request_id: Uuid::new_v4().simple().to_string(),
            artifact: artifact.to_string(),
            technique,
        }
    }

    /// Publish the context to this thread's MDC until the guard drops.
    /// Never hold the guard across an `.await`; use [`instrument`](Self::instrument).
    pub fn enter(&self) -> MdcGuard {
        let saved = MDC_KEYS
            .iter()
            .map(|key| (*key, log_mdc::get(*key, |value| value.map(str::to_string))))
            .collect();

        log_mdc::insert("request", self.request_id.as_str());
        log_mdc::insert("artifact", self.artifact.as_str());
        log_mdc::insert("technique", self.technique);
        MdcGuard { saved }
    }

    /// Run `f` with the context published
    pub fn scope<T>(&self, f: impl FnOnce() -> T) -> T {
        let _mdc = self.enter();
        f()
    }

    /// Publish the context around every poll of `future`
    pub fn instrument<'a, F>(&self, future: F) -> impl Future<Output = F::Output> + 'a
    where
        F: Future + 'a,
    {
        let context = self.clone();
        let mut future = Box::pin(future);
        poll_fn(move |cx| {
            let _mdc = context.enter();
            future.as_mut().poll(cx)
        })
    }
}

/// Puts back the MDC values that were present before [`RequestContext::enter`]
pub struct MdcGuard {
    saved: Vec<(&'static str, Option<String>)>,
}

impl Drop for MdcGuard {
    fn drop(&mut self) {
        for (key, previous) in self.saved.drain(..) {
            match previous {
                Some(value) => log_mdc::insert(key, value),
                None => log_mdc::remove(key),
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn mdc(key: &str) -> Option<String> {
        log_mdc::get(key, |v| v.map(str::to_string))
    }

    #[test]
    fn test_context_populates_and_clears_mdc() {
        let context = RequestContext::new("cat.png", "zsteg");
        assert_eq!(context.request_id.len(), 32);

        {
            let _guard = context.enter();
            assert_eq!(mdc("artifact"), Some("cat.png".to_string()));
            assert_eq!(mdc("technique"), Some("zsteg".to_string()));
        }

        assert_eq!(mdc("artifact"), None);
    }

    #[test]
    fn test_nested_context_restores_outer() {
        let outer = RequestContext::new("outer.png", "binwalk");
        let inner = RequestContext::new("inner.png", "strings");

        let _outer = outer.enter();
        inner.scope(|| assert_eq!(mdc("artifact"), Some("inner.png".to_string())));

        assert_eq!(mdc("artifact"), Some("outer.png".to_string()));
        assert_eq!(mdc("request"), Some(outer.request_id.clone()));
    }

    #[tokio::test]
    async fn test_instrumented_futures_keep_their_own_context() {
        let first = RequestContext::new("first.png", "binwalk");
        let second = RequestContext::new("second.png", "binwalk");

        let observe = || async {
            let before = mdc("artifact");
            tokio::time::sleep(Duration::from_millis(20)).await;
            (before, mdc("artifact"))
        };

        let (a, b) = futures::join!(first.instrument(observe()), second.instrument(observe()));

        assert_eq!(a, (Some("first.png".to_string()), Some("first.png".to_string())));
        assert_eq!(b, (Some("second.png".to_string()), Some("second.png".to_string())));
        assert_eq!(mdc("artifact"), None);
    }
}
