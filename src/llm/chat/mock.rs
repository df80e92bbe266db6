use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{ ChatClient, CompletionResponse, PromptMessage };
use crate::llm::LlmError;

/// Scripted client: each `Some` answers one call, each `None` (or an empty
/// script) fails it with a 503.
pub(crate) struct MockChatClient {
    script: Mutex<VecDeque<Option<String>>>,
    calls: Mutex<Vec<(Vec<PromptMessage>, bool)>>,
}

impl MockChatClient {
    pub(crate) fn new(script: Vec<Option<String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self::new(Vec::new())
    }

    pub(crate) fn calls(&self) -> Vec<(Vec<PromptMessage>, bool)> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatClient for MockChatClient {
    async fn complete(
        &self,
        messages: &[PromptMessage],
        expect_json: bool
    ) -> Result<CompletionResponse, LlmError> {
        self.calls.lock().unwrap().push((messages.to_vec(), expect_json));
        let next = self.script.lock().unwrap().pop_front().flatten();
        match next {
            Some(response) => Ok(CompletionResponse { response }),
            None => Err(LlmError::Status { status: 503, body: "upstream unavailable".into() }),
        }
    }

    fn get_model(&self) -> String {
        "mock".to_string()
    }

    fn get_base_url(&self) -> Option<String> {
        None
    }
}
