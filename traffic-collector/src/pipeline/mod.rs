use std::{marker::PhantomData, pin::Pin, time::SystemTime};

use futures::Stream;

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
}

impl<T> Envelope<T> {
    pub fn now(payload: T) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
}

pub type EnvelopeStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> EnvelopeStream<T>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

pub struct Pipeline<S, T, K> {
    pub source: S,
    pub sink: K,
    _payload: PhantomData<fn() -> T>,
}

impl<S, T, K> Pipeline<S, T, K>
where
    T: Send + 'static,
    S: Source<T>,
    K: Sink<T>,
{
    pub fn new(source: S, sink: K) -> Self {
        Self {
            source,
            sink,
            _payload: PhantomData,
        }
    }

    pub async fn run(self) -> Result<(), PipelineError> {
        let stream = self.source.stream().await;
        self.sink.run(stream).await
    }
}
