//! Streaming completion support.
//!
//! A [`CompletionStream`] is a lazy, finite, non-restartable sequence of text
//! deltas. Dropping it drops the underlying HTTP response, which closes the
//! provider connection promptly.

use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use futures::Stream;

use crate::Result;

/// Boxed stream of text deltas produced by a streaming completion.
pub struct CompletionStream {
    inner: Pin<Box<dyn Stream<Item = Result<String>> + Send>>,
}

impl CompletionStream {
    /// Wraps a provider-specific delta stream.
    #[must_use]
    pub fn new<S>(inner: S) -> Self
    where
        S: Stream<Item = Result<String>> + Send + 'static,
    {
        Self {
            inner: Box::pin(inner),
        }
    }

    /// A stream that yields a fixed sequence of deltas (testing).
    #[must_use]
    pub fn from_deltas(deltas: Vec<String>) -> Self {
        Self::new(futures::stream::iter(deltas.into_iter().map(Ok)))
    }
}

impl Stream for CompletionStream {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().inner.as_mut().poll_next(cx)
    }
}
