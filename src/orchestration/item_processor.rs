//! # Item Processor
//!
//! The one collaborator each call site injects: a function that processes a
//! single payload (encode a QR code, validate a mapped row, render a report).
//!
//! Two failure channels are kept apart:
//! - `Ok(ItemOutcome::Failure(reason))` is a business failure of this item. It
//!   is recorded on the item and never affects other items.
//! - `Err(FatalProcessingError)` means the processor itself is unusable (lost
//!   connection pool, exhausted disk). It aborts the whole session.

use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use thiserror::Error;

/// Result of processing one payload
#[derive(Debug, Clone, PartialEq)]
pub enum ItemOutcome {
    Success(Option<Value>),
    Failure(String),
}

impl ItemOutcome {
    pub fn success() -> Self {
        Self::Success(None)
    }

    pub fn success_with(output: Value) -> Self {
        Self::Success(Some(output))
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure(reason.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Systemic failure of the processing function
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct FatalProcessingError {
    pub reason: String,
}

impl FatalProcessingError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub type ProcessResult = Result<ItemOutcome, FatalProcessingError>;

/// Payload-agnostic processing hook supplied by each use case
#[async_trait]
pub trait ItemProcessor<P>: Send + Sync {
    async fn process(&self, payload: &P) -> ProcessResult;

    /// Name used in logs
    fn name(&self) -> &str {
        "item_processor"
    }
}

/// Adapter turning an async closure into an [`ItemProcessor`]
pub struct FnProcessor<P, F> {
    name: String,
    f: F,
    _payload: PhantomData<fn(P)>,
}

impl<P, F> FnProcessor<P, F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
            _payload: PhantomData,
        }
    }
}

#[async_trait]
impl<P, F, Fut> ItemProcessor<P> for FnProcessor<P, F>
where
    P: Clone + Send + Sync + 'static,
    F: Fn(P) -> Fut + Send + Sync,
    Fut: Future<Output = ProcessResult> + Send,
{
    async fn process(&self, payload: &P) -> ProcessResult {
        (self.f)(payload.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Wrap an async closure as a shareable processor
pub fn processor_fn<P, F, Fut>(name: impl Into<String>, f: F) -> Arc<dyn ItemProcessor<P>>
where
    P: Clone + Send + Sync + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProcessResult> + Send + 'static,
{
    Arc::new(FnProcessor::new(name, f))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct UppercaseProcessor;

    #[async_trait]
    impl ItemProcessor<String> for UppercaseProcessor {
        async fn process(&self, payload: &String) -> ProcessResult {
            if payload.is_empty() {
                return Ok(ItemOutcome::failure("empty payload"));
            }
            Ok(ItemOutcome::success_with(Value::String(payload.to_uppercase())))
        }
    }

    #[tokio::test]
    async fn test_trait_impl() {
        let processor = UppercaseProcessor;
        assert_eq!(
            processor.process(&"qr".to_string()).await.unwrap(),
            ItemOutcome::Success(Some(Value::String("QR".into())))
        );
        assert_eq!(
            processor.process(&String::new()).await.unwrap(),
            ItemOutcome::Failure("empty payload".into())
        );
        assert_eq!(processor.name(), "item_processor");
    }

    #[tokio::test]
    async fn test_closure_adapter() {
        let processor = processor_fn("double", |n: u32| async move {
            if n == 0 {
                Err(FatalProcessingError::new("renderer offline"))
            } else {
                Ok(ItemOutcome::success_with(serde_json::json!(n * 2)))
            }
        });

        assert_eq!(processor.name(), "double");
        assert_eq!(
            processor.process(&21).await.unwrap(),
            ItemOutcome::success_with(serde_json::json!(42))
        );
        let fatal = processor.process(&0).await.unwrap_err();
        assert_eq!(fatal.to_string(), "renderer offline");
    }
}
