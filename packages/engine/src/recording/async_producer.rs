// packages/engine/src/recording/async_producer.rs
//! Wrappers that report the outcome of futures and streams
//!
//! A wrapper yields exactly what the inner producer yields. When it carries a
//! [`CompletionReporter`], each outcome is also written to the log under the
//! producer's `(anchor probe, correlation id)` pair. A wrapper dropped before
//! completing writes nothing further.

use crate::recording::correlation::PendingCorrelation;
use crate::recording::engine::RecordingEngine;
use futures::Stream;
use serde::Serialize;
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

/// Writes completion events for one correlation
pub struct CompletionReporter {
    engine: RecordingEngine,
    pending: PendingCorrelation,
}

impl CompletionReporter {
    pub(crate) fn new(engine: RecordingEngine, pending: PendingCorrelation) -> Self {
        Self { engine, pending }
    }

    fn report<T: Serialize, E: Display>(&self, outcome: &Result<T, E>) {
        self.engine.write_completion(&self.pending, outcome);
    }
}

/// Future wrapper returned by [`RecordingEngine::record_future`]
#[must_use = "futures do nothing unless polled"]
pub struct Correlated<F> {
    inner: Pin<Box<F>>,
    reporter: Option<CompletionReporter>,
}

impl<F> Correlated<F> {
    pub(crate) fn new(inner: F, reporter: Option<CompletionReporter>) -> Self {
        Self {
            inner: Box::pin(inner),
            reporter,
        }
    }

    /// Correlation this future reports under, if any
    pub fn correlation(&self) -> Option<PendingCorrelation> {
        self.reporter.as_ref().map(|r| r.pending)
    }
}

impl<F, T, E> Future for Correlated<F>
where
    F: Future<Output = Result<T, E>>,
    T: Serialize,
    E: Display,
{
    type Output = Result<T, E>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let output = ready!(this.inner.as_mut().poll(cx));

        if let Some(reporter) = this.reporter.take() {
            reporter.report(&output);
        }
        Poll::Ready(output)
    }
}

/// Stream wrapper returned by [`RecordingEngine::record_stream`]
#[must_use = "streams do nothing unless polled"]
pub struct CorrelatedStream<S> {
    inner: Pin<Box<S>>,
    reporter: Option<CompletionReporter>,
}

impl<S> CorrelatedStream<S> {
    pub(crate) fn new(inner: S, reporter: Option<CompletionReporter>) -> Self {
        Self {
            inner: Box::pin(inner),
            reporter,
        }
    }

    pub fn correlation(&self) -> Option<PendingCorrelation> {
        self.reporter.as_ref().map(|r| r.pending)
    }
}

impl<S, T, E> Stream for CorrelatedStream<S>
where
    S: Stream<Item = Result<T, E>>,
    T: Serialize,
    E: Display,
{
    type Item = Result<T, E>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        let item = ready!(this.inner.as_mut().poll_next(cx));

        match &item {
            Some(outcome) => {
                if let Some(reporter) = &this.reporter {
                    reporter.report(outcome);
                }
            }
            None => this.reporter = None,
        }
        Poll::Ready(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}
