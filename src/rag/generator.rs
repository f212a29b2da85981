use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::config::AppConfig;
use crate::corpus::store::Chunk;
use crate::llm::{Complete, LlmError};
use crate::rag::fence::extract_sql;
use crate::rag::prompt::build_prompt;
use crate::sql::validate;

pub const MSG_FALLBACK: &str = "LLM error. Fallback used.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// SQL came from the model
    Generated,
    /// SQL is the top context's reference answer
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationResult {
    /// Canonical SQL when valid, otherwise the text as received.
    pub sql: String,
    pub valid: bool,
    pub message: String,
    pub origin: Origin,
}

/// Prompt -> model -> fence stripping -> validation, with a deterministic
/// fallback to the best context's reference answer when the model call fails.
pub struct Generator {
    llm: Arc<dyn Complete>,
    temperature: f32,
    timeout: Duration,
    max_context_chars: usize,
}

impl Generator {
    pub fn new(
        llm: Arc<dyn Complete>,
        temperature: f32,
        timeout: Duration,
        max_context_chars: usize,
    ) -> Self {
        Self {
            llm,
            temperature,
            timeout,
            max_context_chars,
        }
    }

    pub fn from_config(llm: Arc<dyn Complete>, cfg: &AppConfig) -> Self {
        Self::new(
            llm,
            cfg.llm.temperature,
            cfg.llm.timeout(),
            cfg.prompt.max_context_chars,
        )
    }

    pub async fn generate(&self, question: &str, contexts: &[Chunk]) -> GenerationResult {
        let prompt = build_prompt(question, contexts, self.max_context_chars);
        tracing::debug!("prompt: {} chars, {} contexts offered", prompt.chars().count(), contexts.len());

        let raw = match self.complete(&prompt).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(kind = e.kind(), "LLM call failed, using fallback: {e}");
                return fallback(contexts);
            }
        };

        let sql = extract_sql(&raw);
        let outcome = validate(&sql);
        if !outcome.is_valid {
            tracing::info!("model output rejected: {}", outcome.message);
        }
        GenerationResult {
            sql: if outcome.is_valid { outcome.formatted_sql } else { sql },
            valid: outcome.is_valid,
            message: outcome.message,
            origin: Origin::Generated,
        }
    }

    /// One attempt, bounded by the configured timeout. No retries.
    pub async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        match tokio::time::timeout(self.timeout, self.llm.complete(prompt, self.temperature)).await {
            Ok(result) => result,
            Err(_) => Err(LlmError::Timeout(self.timeout)),
        }
    }
}

fn fallback(contexts: &[Chunk]) -> GenerationResult {
    let answer = contexts.first().map(|c| c.answer.as_str()).unwrap_or("");
    let outcome = validate(answer);
    if outcome.is_valid {
        GenerationResult {
            sql: outcome.formatted_sql,
            valid: true,
            message: MSG_FALLBACK.to_string(),
            origin: Origin::Fallback,
        }
    } else {
        GenerationResult {
            sql: answer.to_string(),
            valid: false,
            message: format!("{MSG_FALLBACK} {}", outcome.message),
            origin: Origin::Fallback,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a canned reply and remembers what it was asked.
    pub(crate) struct ScriptedLlm {
        pub reply: std::result::Result<String, fn() -> LlmError>,
        pub seen: Mutex<Vec<(String, f32)>>,
    }

    impl ScriptedLlm {
        pub fn replying(text: &str) -> Self {
            Self {
                reply: Ok(text.to_string()),
                seen: Mutex::new(Vec::new()),
            }
        }

        pub fn failing(err: fn() -> LlmError) -> Self {
            Self {
                reply: Err(err),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Complete for ScriptedLlm {
        async fn complete(&self, prompt: &str, temperature: f32) -> std::result::Result<String, LlmError> {
            self.seen.lock().unwrap().push((prompt.to_string(), temperature));
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(make) => Err(make()),
            }
        }
    }

    struct HangingLlm;

    #[async_trait]
    impl Complete for HangingLlm {
        async fn complete(&self, _prompt: &str, _temperature: f32) -> std::result::Result<String, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("SELECT 1".into())
        }
    }

    fn generator(llm: Arc<dyn Complete>) -> Generator {
        Generator::new(llm, 0.2, Duration::from_secs(5), 3000)
    }

    fn contexts() -> Vec<Chunk> {
        vec![Chunk::new("Context: t\nQuestion: q1", "SELECT a FROM t")]
    }

    #[tokio::test]
    async fn failing_llm_falls_back_to_top_answer() {
        let g = generator(Arc::new(ScriptedLlm::failing(|| LlmError::Http("503".into()))));
        let result = g.generate("q1", &contexts()).await;
        assert_eq!(
            result,
            GenerationResult {
                sql: "SELECT a FROM t".into(),
                valid: true,
                message: MSG_FALLBACK.into(),
                origin: Origin::Fallback,
            }
        );
    }

    #[tokio::test]
    async fn timeout_takes_the_fallback_path() {
        let g = Generator::new(Arc::new(HangingLlm), 0.2, Duration::from_millis(20), 3000);
        let result = g.generate("q1", &contexts()).await;
        assert_eq!(result.origin, Origin::Fallback);
        assert!(result.valid);
    }

    #[tokio::test]
    async fn fallback_without_contexts_is_invalid_but_explained() {
        let g = generator(Arc::new(ScriptedLlm::failing(|| LlmError::Quota("429".into()))));
        let result = g.generate("q1", &[]).await;
        assert!(!result.valid);
        assert!(result.sql.is_empty());
        assert!(result.message.starts_with(MSG_FALLBACK));
        assert!(result.message.contains("Empty query"));
    }

    #[tokio::test]
    async fn unsafe_fallback_answer_is_not_passed_through() {
        let g = generator(Arc::new(ScriptedLlm::failing(|| LlmError::Auth("401".into()))));
        let ctx = [Chunk::new("x", "DELETE FROM t")];
        let result = g.generate("q", &ctx).await;
        assert!(!result.valid);
        assert!(result.message.contains("Forbidden"));
    }

    #[tokio::test]
    async fn fenced_model_output_is_extracted_and_formatted() {
        let llm = Arc::new(ScriptedLlm::replying("Sure!\n```sql\nselect count(*) from head\n```"));
        let g = generator(llm.clone());
        let result = g.generate("How many heads?", &contexts()).await;

        assert!(result.valid);
        assert_eq!(result.origin, Origin::Generated);
        assert_eq!(result.message, "OK");
        assert_eq!(result.sql, "SELECT count(*) FROM head");

        let seen = llm.seen.lock().unwrap();
        assert_eq!(seen.len(), 1, "exactly one model call");
        assert!((seen[0].1 - 0.2).abs() < f32::EPSILON);
        assert!(seen[0].0.ends_with("User question: How many heads?\nSQL:"));
        assert!(seen[0].0.contains("Example: SELECT a FROM t"));
    }

    #[tokio::test]
    async fn destructive_model_output_is_reported_not_replaced() {
        let llm = Arc::new(ScriptedLlm::replying("DROP TABLE head"));
        let result = generator(llm).generate("q", &contexts()).await;
        assert!(!result.valid);
        assert_eq!(result.origin, Origin::Generated);
        assert_eq!(result.sql, "DROP TABLE head");
        assert_eq!(result.message, crate::sql::validate::MSG_FORBIDDEN);
    }

    #[tokio::test]
    async fn malformed_reply_falls_back() {
        let g = generator(Arc::new(ScriptedLlm::failing(|| {
            LlmError::Malformed("no text".into())
        })));
        let result = g.generate("q1", &contexts()).await;
        assert_eq!(result.origin, Origin::Fallback);
        assert_ne!(result.message, "OK");
    }
}
