use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Instant;

use cosign_core::error::{CosignError, Result};
use cosign_core::traits::DocumentGenerator;
use cosign_core::types::GenerationRequest;

enum Script {
    Always(String),
    Failing(String),
    /// Replayed in order; the last entry repeats once the queue runs dry.
    Sequence(VecDeque<std::result::Result<String, String>>),
}

/// Generator that replays canned responses and records every call.
pub struct ScriptedGenerator {
    script: Mutex<Script>,
    calls: Mutex<Vec<(Instant, GenerationRequest)>>,
}

impl ScriptedGenerator {
    fn with(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn always(text: &str) -> Self {
        Self::with(Script::Always(text.to_string()))
    }

    pub fn failing(message: &str) -> Self {
        Self::with(Script::Failing(message.to_string()))
    }

    pub fn sequence(responses: Vec<std::result::Result<String, String>>) -> Self {
        Self::with(Script::Sequence(responses.into()))
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().iter().map(|(t, _)| *t).collect()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, r)| r.clone())
            .collect()
    }
}

impl DocumentGenerator for ScriptedGenerator {
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((Instant::now(), request.clone()));

        let mut script = self.script.lock().unwrap();
        let next = match &mut *script {
            Script::Always(text) => Ok(text.clone()),
            Script::Failing(message) => Err(message.clone()),
            Script::Sequence(queue) => {
                if queue.len() > 1 {
                    queue.pop_front().unwrap_or_else(|| Err("script exhausted".into()))
                } else {
                    queue
                        .front()
                        .cloned()
                        .unwrap_or_else(|| Err("script exhausted".into()))
                }
            }
        };
        next.map_err(CosignError::Generator)
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
