// crates/client/src/invoke.rs
//! Skill invocation: one authenticated streaming request driving the
//! decode → split → normalize pipeline into a step aggregator.
//!
//! Per invocation there is exactly one sequential read loop (the network
//! read is the only suspension point) feeding normalized events over a
//! bounded channel into a dedicated aggregator task. Cancellation aborts
//! the aggregator before tearing down the read loop, so events still
//! sitting in the channel are discarded by the aborted state machine.
//! Transport failures surface as a terminal error while the partially
//! aggregated state stays available for salvage; there is no internal
//! retry.

use std::sync::Arc;

use futures_util::StreamExt;
use reqwest::StatusCode;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use skillstream_core::{
    FlushMetadata, Framing, SkillEvent, SkillStreamPipeline, StepAggregator, StepRecord, StepRef,
};

use crate::auth::CredentialStore;
use crate::error::ClientError;

/// Configuration for the skill-invocation client.
#[derive(Debug, Clone)]
pub struct InvokeConfig {
    /// Skill-invocation endpoint URL.
    pub endpoint: String,
    /// Bound of the event channel between the read loop and the
    /// aggregator task.
    pub channel_capacity: usize,
}

impl Default for InvokeConfig {
    fn default() -> Self {
        Self {
            endpoint: std::env::var("SKILLSTREAM_ENDPOINT")
                .unwrap_or_else(|_| "http://127.0.0.1:3000/v1/skills/invoke".to_string()),
            channel_capacity: 256,
        }
    }
}

/// One skill invocation.
#[derive(Debug, Clone)]
pub struct InvocationRequest {
    pub skill_name: String,
    pub input: serde_json::Value,
    /// Step the streamed answer content is attributed to.
    pub step: Option<StepRef>,
    /// Wire framing the producer speaks.
    pub framing: Framing,
}

impl InvocationRequest {
    pub fn new(skill_name: impl Into<String>, input: serde_json::Value) -> Self {
        Self {
            skill_name: skill_name.into(),
            input,
            step: None,
            framing: Framing::default(),
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.step = Some(StepRef::new(step));
        self
    }

    pub fn with_framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }
}

pub struct SkillClient {
    http: reqwest::Client,
    credentials: Arc<CredentialStore>,
    config: InvokeConfig,
}

/// Live handle to a running invocation. Clone the aggregator handle before
/// `join` if you need the state after a transport error.
#[derive(Debug)]
pub struct InvocationHandle {
    aggregator: Arc<Mutex<StepAggregator>>,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), ClientError>>,
}

impl InvocationHandle {
    /// Shared handle to the aggregated state. Survives `join`.
    pub fn aggregator(&self) -> Arc<Mutex<StepAggregator>> {
        Arc::clone(&self.aggregator)
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cooperatively stop the invocation: the aggregator is aborted first
    /// so events still buffered in the channel become no-ops, then the
    /// read loop is torn down.
    pub async fn abort(&self) {
        self.aggregator.lock().await.abort();
        self.cancel.cancel();
    }

    /// Wait for the read loop and aggregator task to finish.
    pub async fn join(self) -> Result<(), ClientError> {
        match self.task.await {
            Ok(result) => result,
            Err(err) => Err(ClientError::Task {
                message: err.to_string(),
            }),
        }
    }

    /// Flush the current aggregated state. Side-effect free; callable in
    /// any state, including after `abort`.
    pub async fn flush(&self, metadata: &FlushMetadata) -> Result<Vec<StepRecord>, ClientError> {
        Ok(self.aggregator.lock().await.flush(metadata)?)
    }
}

impl SkillClient {
    pub fn new(credentials: Arc<CredentialStore>, config: InvokeConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            credentials,
            config,
        }
    }

    /// Start one invocation. Returns once the response headers are in; the
    /// body is consumed by a background task reachable through the handle.
    pub async fn invoke(&self, request: InvocationRequest) -> Result<InvocationHandle, ClientError> {
        let response = self.send_authenticated(&request).await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status { status });
        }
        debug!(skill = %request.skill_name, %status, "skill stream opened");

        let aggregator = Arc::new(Mutex::new(StepAggregator::new()));
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel::<SkillEvent>(self.config.channel_capacity);

        let consumer = tokio::spawn(consume_events(rx, Arc::clone(&aggregator)));
        let pipeline = SkillStreamPipeline::new(request.framing.clone(), request.step.clone());
        let read_cancel = cancel.clone();
        let task = tokio::spawn(async move {
            let result = read_stream(response, pipeline, tx, read_cancel).await;
            // The sender is gone; wait for the consumer to drain the channel.
            if let Err(err) = consumer.await {
                warn!(error = %err, "aggregator task failed");
            }
            result
        });

        Ok(InvocationHandle {
            aggregator,
            cancel,
            task,
        })
    }

    /// Send the request with the current bearer token; on a 401, refresh
    /// (single-flight) and retry exactly once.
    async fn send_authenticated(
        &self,
        request: &InvocationRequest,
    ) -> Result<reqwest::Response, ClientError> {
        let body = serde_json::json!({
            "skillName": request.skill_name,
            "input": request.input,
        });
        let token = self.credentials.bearer().await;
        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!("skill endpoint returned 401, refreshing credential");
        let fresh = self.credentials.refresh_if_stale(&token).await?;
        let retry = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&fresh)
            .json(&body)
            .send()
            .await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }
        Ok(retry)
    }
}

async fn read_stream(
    response: reqwest::Response,
    mut pipeline: SkillStreamPipeline,
    tx: mpsc::Sender<SkillEvent>,
    cancel: CancellationToken,
) -> Result<(), ClientError> {
    let mut stream = response.bytes_stream();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("invocation cancelled, stopping read loop");
                return Ok(());
            }
            chunk = stream.next() => match chunk {
                Some(Ok(bytes)) => {
                    for event in pipeline.push(&bytes) {
                        if tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                }
                Some(Err(err)) => {
                    // Salvage what the stages still hold before surfacing
                    // the transport failure.
                    for event in pipeline.finish() {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    return Err(ClientError::Request(err));
                }
                None => {
                    for event in pipeline.finish() {
                        if tx.send(event).await.is_err() {
                            return Ok(());
                        }
                    }
                    return Ok(());
                }
            }
        }
    }
}

async fn consume_events(mut rx: mpsc::Receiver<SkillEvent>, aggregator: Arc<Mutex<StepAggregator>>) {
    while let Some(event) = rx.recv().await {
        aggregator.lock().await.add_event(event);
    }
}
