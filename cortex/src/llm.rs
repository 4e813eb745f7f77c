//! Remote decision engine backed by an OpenAI-compatible chat endpoint.
//!
//! The model is asked to reply with a JSON decision document; anything it
//! cannot express as a task request comes back as a chat response. Transport
//! and decoding failures surface as engine errors, which the orchestrator
//! turns into a fallback message on the session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use agenthub_proto::{AgentCard, Message};
use agenthub_core::LlmConfig;

use crate::engine::{Action, Decision, DecisionEngine, Trigger};
use crate::{CortexError, Result};

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireAction {
    ChatResponse {
        text: String,
    },
    TaskRequest {
        task_type: String,
        #[serde(default)]
        payload: serde_json::Value,
        #[serde(default)]
        target_agent: String,
        #[serde(default)]
        correlation_id: String,
    },
}

impl From<WireAction> for Action {
    fn from(wire: WireAction) -> Self {
        match wire {
            WireAction::ChatResponse { text } => Action::ChatResponse { text },
            WireAction::TaskRequest {
                task_type,
                payload,
                target_agent,
                correlation_id,
            } => Action::TaskRequest {
                task_type,
                payload,
                target_agent,
                correlation_id,
            },
        }
    }
}

#[derive(Deserialize)]
struct WireDecision {
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    actions: Vec<WireAction>,
}

pub struct LlmEngine {
    http: reqwest::Client,
    config: LlmConfig,
}

impl LlmEngine {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| CortexError::Engine(e.to_string()))?;
        Ok(Self { http, config })
    }

    fn system_prompt(agents: &[AgentCard]) -> String {
        let mut prompt = String::from(
            "You orchestrate a team of agents. Reply with JSON only: \
             {\"reasoning\": string, \"actions\": [{\"type\": \"chat_response\", \"text\": string} \
             | {\"type\": \"task_request\", \"task_type\": string, \"payload\": object, \
             \"target_agent\": string}]}.\nAvailable agents:\n",
        );
        for card in agents {
            let tags: Vec<&str> = card
                .skills
                .iter()
                .flat_map(|s| s.tags.iter().map(String::as_str))
                .collect();
            prompt.push_str(&format!("- {} (skills: {})\n", card.name, tags.join(", ")));
        }
        prompt
    }

    fn transcript(history: &[Message], trigger: &Trigger) -> String {
        let mut out = String::new();
        for message in history {
            out.push_str(&format!(
                "[{:?}] {}\n",
                message.role(),
                message.text_content()
            ));
        }
        out.push_str(&format!(
            "\nTriggering event ({:?}): {}\n",
            trigger.kind,
            trigger.message.text_content()
        ));
        for artifact in &trigger.artifacts {
            for part in &artifact.parts {
                if let Some(text) = part.as_text() {
                    out.push_str(&format!("Task result artifact: {text}\n"));
                }
            }
        }
        out
    }
}

#[async_trait]
impl DecisionEngine for LlmEngine {
    async fn decide(
        &self,
        history: Vec<Message>,
        agents: Vec<AgentCard>,
        trigger: Trigger,
    ) -> Result<Decision> {
        let url = format!(
            "{}/chat/completions",
            self.config.url.trim_end_matches('/')
        );
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: Self::system_prompt(&agents),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::transcript(&history, &trigger),
                },
            ],
            temperature: 0.2,
        };

        let mut call = self.http.post(&url).json(&request);
        if let Some(key) = &self.config.api_key {
            call = call.bearer_auth(key);
        }
        let response = call
            .send()
            .await
            .map_err(|e| CortexError::Engine(format!("llm request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(CortexError::Engine(format!(
                "llm endpoint returned {}",
                response.status()
            )));
        }
        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| CortexError::Engine(format!("undecodable llm response: {e}")))?;
        let content = completion
            .choices
            .first()
            .map(|c| c.message.content.as_str())
            .unwrap_or_default();
        debug!(content_len = content.len(), "llm decision received");

        let wire: WireDecision = serde_json::from_str(content)
            .map_err(|e| CortexError::Engine(format!("undecodable decision document: {e}")))?;
        Ok(Decision {
            reasoning: wire.reasoning,
            actions: wire.actions.into_iter().map(Action::from).collect(),
        })
    }
}
