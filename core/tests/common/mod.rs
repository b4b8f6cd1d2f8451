#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use mnemo_core::config::Config;
use mnemo_core::error::LlmError;
use mnemo_core::llm::{Completion, CompletionRequest, LanguageModel};

pub const EMBEDDING_DIMS: usize = 64;

/// Text returned when a test did not queue a completion.
pub const UNSCRIPTED: &str = "(unscripted)";

#[derive(Default)]
struct Inner {
    completions: Mutex<VecDeque<Result<Completion, LlmError>>>,
    requests: Mutex<Vec<CompletionRequest>>,
    embed_calls: Mutex<usize>,
    fail_embeddings: Mutex<bool>,
}

/// Deterministic `LanguageModel` for tests. Completions are served from a
/// queue; embeddings are bag-of-words hashes so texts that share words are
/// similar. Clones share state, so a test keeps a handle after moving one
/// into a `Chatbot`.
#[derive(Clone, Default)]
pub struct ScriptedModel {
    inner: Arc<Inner>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_text(&self, text: &str) {
        self.push(Ok(Completion::text(text)));
    }

    pub fn push_call(&self, name: &str, arguments: &str) {
        self.push(Ok(Completion::call(name, arguments)));
    }

    pub fn push_empty(&self) {
        self.push(Ok(Completion::default()));
    }

    pub fn push_error(&self) {
        self.push(Err(LlmError::Status { status: 500, body: "upstream exploded".to_string() }));
    }

    pub fn push(&self, completion: Result<Completion, LlmError>) {
        self.inner.completions.lock().unwrap().push_back(completion);
    }

    pub fn fail_embeddings(&self, fail: bool) {
        *self.inner.fail_embeddings.lock().unwrap() = fail;
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.inner.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.inner.completions.lock().unwrap().len()
    }

    pub fn embed_calls(&self) -> usize {
        *self.inner.embed_calls.lock().unwrap()
    }
}

impl LanguageModel for ScriptedModel {
    fn complete(&self, request: &CompletionRequest) -> Result<Completion, LlmError> {
        self.inner.requests.lock().unwrap().push(request.clone());
        self.inner
            .completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Completion::text(UNSCRIPTED)))
    }

    fn embed(&self, _model: &str, inputs: &[String]) -> Result<Vec<Vec<f32>>, LlmError> {
        *self.inner.embed_calls.lock().unwrap() += 1;
        if *self.inner.fail_embeddings.lock().unwrap() {
            return Err(LlmError::Transport("embedding service unavailable".to_string()));
        }
        Ok(inputs.iter().map(|t| bag_of_words(t)).collect())
    }
}

/// Hash each lowercase word into a fixed-size count vector (FNV-1a).
pub fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIMS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hash: u64 = 0xcbf29ce484222325;
        for b in word.to_lowercase().bytes() {
            hash ^= b as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        v[(hash % EMBEDDING_DIMS as u64) as usize] += 1.0;
    }
    v
}

/// Default config with a test-friendly history budget.
pub fn test_config() -> Config {
    Config::default()
}

/// System prompt of a recorded request.
pub fn system_prompt(request: &CompletionRequest) -> &str {
    &request.messages[0].content
}
