use std::time::Duration;

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
    tracing::{debug, trace, warn},
};

use crate::{
    model::{CompletionResponse, ConversationItem, LlmProvider, ModelOutput, ToolCall, Usage},
    tool_parsing::new_synthetic_tool_call_id,
    tool_registry::ToolManifestEntry,
};

/// Availability probes should fail fast regardless of the request timeout.
const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Ollama `/api/chat` provider (non-streaming).
pub struct OllamaProvider {
    /// API root, e.g. `http://localhost:11434/api`.
    base_url: String,
    model: String,
    api_key: Option<Secret<String>>,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            api_key: None,
            client,
        })
    }

    /// Bearer token for authenticating proxies in front of Ollama.
    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<Secret<String>>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Check that the server answers and list the models it has pulled.
    pub async fn ping(&self) -> anyhow::Result<Vec<String>> {
        let resp = self
            .authorized(self.client.get(self.tags_url()))
            .timeout(PING_TIMEOUT)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("Ollama tags endpoint returned HTTP {status}");
        }
        let body: serde_json::Value = resp.json().await?;
        Ok(body["models"]
            .as_array()
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m["name"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn tags_url(&self) -> String {
        if self.base_url.ends_with("/api") {
            format!("{}/tags", self.base_url)
        } else {
            format!("{}/api/tags", self.base_url)
        }
    }

    fn authorized(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => req.bearer_auth(key.expose_secret()),
            None => req,
        }
    }

    fn request_body(
        &self,
        items: &[ConversationItem],
        manifest: &[ToolManifestEntry],
        temperature: f32,
    ) -> serde_json::Value {
        let messages: Vec<serde_json::Value> =
            items.iter().map(ConversationItem::to_chat_value).collect();
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": false,
            "options": { "temperature": temperature },
        });
        if !manifest.is_empty() {
            body["tools"] = serde_json::Value::Array(
                manifest
                    .iter()
                    .map(ToolManifestEntry::to_function_value)
                    .collect(),
            );
        }
        body
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    fn id(&self) -> &str {
        &self.model
    }

    fn supports_tools(&self) -> bool {
        true
    }

    async fn complete(
        &self,
        items: &[ConversationItem],
        manifest: &[ToolManifestEntry],
        temperature: f32,
    ) -> anyhow::Result<CompletionResponse> {
        let body = self.request_body(items, manifest, temperature);
        debug!(
            model = %self.model,
            items_count = items.len(),
            tools_count = manifest.len(),
            "ollama chat request"
        );
        trace!(body = %body, "ollama request body");

        let http_resp = self
            .authorized(self.client.post(format!("{}/chat", self.base_url)))
            .json(&body)
            .send()
            .await?;

        let status = http_resp.status();
        if !status.is_success() {
            let body_text = http_resp.text().await.unwrap_or_default();
            warn!(status = %status, model = %self.model, body = %body_text, "ollama API error");
            anyhow::bail!("Ollama API error HTTP {status}: {body_text}");
        }

        let resp: serde_json::Value = http_resp.json().await?;
        trace!(response = %resp, "ollama raw response");
        Ok(parse_chat_response(&resp))
    }
}

fn parse_chat_response(resp: &serde_json::Value) -> CompletionResponse {
    let message = &resp["message"];
    let mut outputs = Vec::new();

    if let Some(content) = message["content"].as_str() {
        let (visible, thinking) = super::strip_think_tags(content);
        if let Some(thinking) = thinking {
            trace!(thinking = %thinking, "ollama reasoning block");
        }
        if !visible.trim().is_empty() {
            outputs.push(ModelOutput::Message(visible));
        }
    }

    if let Some(calls) = message["tool_calls"].as_array() {
        for tc in calls {
            let Some(name) = tc["function"]["name"].as_str() else {
                continue;
            };
            let arguments = match &tc["function"]["arguments"] {
                serde_json::Value::String(raw) => {
                    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({}))
                },
                serde_json::Value::Null => serde_json::json!({}),
                other => other.clone(),
            };
            let id = tc["id"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| new_synthetic_tool_call_id("ollama"));
            outputs.push(ModelOutput::ToolCall(ToolCall {
                id,
                name: name.to_string(),
                arguments,
            }));
        }
    }

    CompletionResponse {
        outputs,
        usage: Usage {
            input_tokens: token_count(&resp["prompt_eval_count"]),
            output_tokens: token_count(&resp["eval_count"]),
        },
    }
}

/// Missing counts read as zero; oversized ones saturate.
fn token_count(value: &serde_json::Value) -> u32 {
    value
        .as_u64()
        .map_or(0, |n| u32::try_from(n).unwrap_or(u32::MAX))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, mockito::Matcher, serde_json::json};

    fn provider(server: &mockito::Server) -> OllamaProvider {
        OllamaProvider::new(
            &format!("{}/api", server.url()),
            "llama3.2",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn text_reply_becomes_message_output() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(Matcher::PartialJson(json!({
                "model": "llama3.2",
                "stream": false,
                "messages": [
                    { "role": "system", "content": "sys" },
                    { "role": "user", "content": "2+2?" }
                ]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"message":{"role":"assistant","content":"4"},"prompt_eval_count":12,"eval_count":3,"done":true}"#,
            )
            .create_async()
            .await;

        let items = [ConversationItem::system("sys"), ConversationItem::user("2+2?")];
        let resp = provider(&server).complete(&items, &[], 0.2).await.unwrap();
        assert_eq!(resp.outputs, vec![ModelOutput::Message("4".into())]);
        assert_eq!(resp.usage.input_tokens, 12);
        assert_eq!(resp.usage.output_tokens, 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn native_tool_calls_are_parsed_and_tools_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/chat")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""tools":\["#.into()),
                Matcher::Regex(r#""name":"calculator""#.into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"message":{"role":"assistant","content":"","tool_calls":[{"function":{"name":"calculator","arguments":{"expression":"2+2"}}}]}}"#,
            )
            .create_async()
            .await;

        let manifest = [ToolManifestEntry {
            name: "calculator".into(),
            description: "math".into(),
            parameters: json!({ "type": "object" }),
        }];
        let resp = provider(&server)
            .complete(&[ConversationItem::user("2+2?")], &manifest, 0.2)
            .await
            .unwrap();
        assert_eq!(resp.outputs.len(), 1);
        let ModelOutput::ToolCall(call) = &resp.outputs[0] else {
            panic!("expected tool call");
        };
        assert_eq!(call.name, "calculator");
        assert_eq!(call.arguments["expression"], "2+2");
        assert!(call.id.starts_with("ollama_"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn http_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/api/chat")
            .with_status(500)
            .with_body("model not found")
            .create_async()
            .await;

        let err = provider(&server)
            .complete(&[ConversationItem::user("hi")], &[], 0.2)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("HTTP 500"));
        assert!(err.to_string().contains("model not found"));
    }

    #[tokio::test]
    async fn ping_lists_models_and_sends_bearer() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/tags")
            .match_header("authorization", "Bearer proxy-token")
            .with_status(200)
            .with_body(r#"{"models":[{"name":"llama3.2:latest"},{"name":"qwen2.5:7b"}]}"#)
            .create_async()
            .await;

        let models = provider(&server)
            .with_api_key(Some(Secret::new("proxy-token".into())))
            .ping()
            .await
            .unwrap();
        assert_eq!(models, vec!["llama3.2:latest", "qwen2.5:7b"]);
        mock.assert_async().await;
    }

    #[test]
    fn think_block_is_hidden() {
        let resp = parse_chat_response(&json!({
            "message": { "content": "<think>simple sum</think>The answer is 4." }
        }));
        assert_eq!(resp.outputs, vec![ModelOutput::Message("The answer is 4.".into())]);
    }

    #[test]
    fn token_counts_saturate_instead_of_wrapping() {
        let resp = parse_chat_response(&json!({
            "message": { "content": "ok" },
            "prompt_eval_count": 5_000_000_000u64,
            "eval_count": 17
        }));
        assert_eq!(resp.usage.input_tokens, u32::MAX);
        assert_eq!(resp.usage.output_tokens, 17);

        let resp = parse_chat_response(&json!({ "message": { "content": "ok" } }));
        assert_eq!(resp.usage.input_tokens, 0);
    }
}
