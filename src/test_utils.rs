//! Shared test doubles used across multiple test modules.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::llm::{ModelBackend, ModelError, ModelRequest};

/// Backend that replays a script of replies and records every request.
///
/// When the script runs out, the last reply repeats.
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, ModelError>>>,
    last: Mutex<Option<Result<String, ModelError>>>,
    requests: Mutex<Vec<ModelRequest>>,
    calls: AtomicUsize,
    delay: Duration,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Result<String, ModelError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Always reply with `text`.
    pub fn replying(text: &str) -> Self {
        Self::new(vec![Ok(text.to_owned())])
    }

    /// Always fail with `error`.
    pub fn failing(error: ModelError) -> Self {
        Self::new(vec![Err(error)])
    }

    /// Sleep before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Text of the most recent prompt.
    pub fn last_prompt(&self) -> Option<String> {
        self.requests
            .lock()
            .expect("requests lock")
            .last()
            .map(|r| r.prompt.text.clone())
    }
}

/// A 503 overload error.
pub fn overloaded() -> ModelError {
    ModelError::Http {
        status: 503,
        message: "The model is overloaded. Please try again later.".into(),
    }
}

#[async_trait]
impl ModelBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: &ModelRequest) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().expect("script lock").pop_front();
        let mut last = self.last.lock().expect("last lock");
        match next {
            Some(reply) => {
                *last = Some(reply.clone());
                reply
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(ModelError::EmptyResponse("script empty".into()))),
        }
    }
}
