use std::io::Write;

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::{ChatMode, OutputFormat};
use crate::corpus::store::Chunk;
use crate::error::Result;
use crate::rag::generator::{Generator, Origin};
use crate::rag::prompt::build_explain_prompt;
use crate::rag::retriever::{RetrievalResult, Retriever, print_results};
use crate::sql::validate::MSG_EMPTY;

/// Everything one question produces.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub sql: String,
    pub valid: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
    pub contexts: Vec<RetrievalResult>,
}

impl Response {
    fn rejected(message: String) -> Self {
        Self {
            sql: String::new(),
            valid: false,
            message,
            origin: None,
            contexts: Vec::new(),
        }
    }
}

pub struct Pipeline {
    retriever: Retriever,
    generator: Generator,
}

impl Pipeline {
    pub fn new(retriever: Retriever, generator: Generator) -> Self {
        Self {
            retriever,
            generator,
        }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Retrieve, then generate. Never fails: every problem ends up in `message`.
    pub async fn respond(&self, query: &str, k: i64) -> Response {
        if query.trim().is_empty() {
            return Response::rejected(MSG_EMPTY.to_string());
        }

        let contexts = match self.retriever.retrieve(query, k).await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!("retrieval failed: {e}");
                return Response::rejected(format!("Retrieval failed: {e}"));
            }
        };

        let chunks: Vec<Chunk> = contexts.iter().map(|r| r.chunk.clone()).collect();
        let result = self.generator.generate(query, &chunks).await;

        Response {
            sql: result.sql,
            valid: result.valid,
            message: result.message,
            origin: Some(result.origin),
            contexts,
        }
    }

    /// Plain-language answer grounded on the retrieved contexts.
    /// Failures come back as bracketed text.
    pub async fn explain(&self, query: &str, contexts: &[RetrievalResult]) -> String {
        let chunks: Vec<Chunk> = contexts.iter().map(|r| r.chunk.clone()).collect();
        let prompt = build_explain_prompt(query, &chunks);
        match self.generator.complete(&prompt).await {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                tracing::warn!(kind = e.kind(), "explanation failed: {e}");
                format!("[Error communicating with LLM: {e}]")
            }
        }
    }
}

#[derive(Serialize)]
struct AskOutput<'a> {
    #[serde(flatten)]
    response: &'a Response,
    #[serde(skip_serializing_if = "Option::is_none")]
    answer: Option<&'a str>,
}

pub async fn ask_cmd(
    pipeline: &Pipeline,
    query: &str,
    k: i64,
    explain: bool,
    format: OutputFormat,
) -> Result<()> {
    let response = pipeline.respond(query, k).await;
    let answer = if explain && !response.contexts.is_empty() {
        Some(pipeline.explain(query, &response.contexts).await)
    } else {
        None
    };

    match format {
        OutputFormat::Text => print_response(&response, answer.as_deref()),
        OutputFormat::Json => {
            let out = AskOutput {
                response: &response,
                answer: answer.as_deref(),
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
    }
    Ok(())
}

fn print_response(response: &Response, answer: Option<&str>) {
    println!("\n{}", "-".repeat(50));
    if let Some(answer) = answer {
        println!("Answer: {answer}");
    }
    let sql = if response.sql.is_empty() {
        "[No SQL generated]"
    } else {
        &response.sql
    };
    println!("Generated SQL: {sql}");
    println!(
        "Valid: {} ({})",
        if response.valid { "yes" } else { "no" },
        response.message
    );
    println!("{}\n", "-".repeat(50));
}

#[derive(Debug, PartialEq, Eq)]
enum ChatInput {
    Exit,
    Blank,
    SetK(i64),
    BadK,
    Query(String),
}

fn parse_chat_input(line: &str) -> ChatInput {
    let line = line.trim();
    if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        return ChatInput::Exit;
    }
    if line.is_empty() {
        return ChatInput::Blank;
    }
    if let Some(value) = line.strip_prefix("k=") {
        return value.trim().parse().map_or(ChatInput::BadK, ChatInput::SetK);
    }
    ChatInput::Query(line.to_string())
}

/// Interactive session. `pipeline` is `None` in retrieval-only mode.
pub async fn chat_cmd(
    retriever: &Retriever,
    pipeline: Option<&Pipeline>,
    mode: ChatMode,
    mut k: i64,
) -> Result<()> {
    println!(
        "SQL Query Assistant ({} mode, {} examples loaded)",
        mode.label(),
        retriever.corpus().len()
    );
    println!("Enter 'quit' or 'exit' to end the session");
    println!("Enter 'k=N' to change the number of results (currently k={k})\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You: ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_chat_input(&line) {
            ChatInput::Exit => break,
            ChatInput::Blank => continue,
            ChatInput::SetK(n) => {
                k = n;
                println!("Number of results set to {k}");
            }
            ChatInput::BadK => println!("Invalid k value. Using previous value ({k})."),
            ChatInput::Query(query) => match pipeline {
                Some(pipeline) => {
                    let response = pipeline.respond(&query, k).await;
                    let answer = if response.contexts.is_empty() {
                        None
                    } else {
                        Some(pipeline.explain(&query, &response.contexts).await)
                    };
                    print_response(&response, answer.as_deref());
                }
                None => match retriever.retrieve(&query, k).await {
                    Ok(results) => print_results(&query, &results),
                    Err(e) => println!("Retrieval failed: {e}"),
                },
            },
        }
    }

    println!("Goodbye!");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::rag::generator::MSG_FALLBACK;
    use crate::rag::generator::tests::ScriptedLlm;
    use crate::rag::retriever::tests::two_chunk_fixture;
    use std::sync::Arc;
    use std::time::Duration;

    fn pipeline(llm: ScriptedLlm) -> Pipeline {
        let (corpus, embedder) = two_chunk_fixture();
        Pipeline::new(
            Retriever::new(corpus, embedder, Duration::from_secs(5)),
            Generator::new(Arc::new(llm), 0.2, Duration::from_secs(5), 3000),
        )
    }

    #[tokio::test]
    async fn full_pipeline_returns_contexts_and_sql() {
        let p = pipeline(ScriptedLlm::replying("```sql\nselect max(budget) from department\n```"));
        let query = p.retriever().corpus().lookup(1).unwrap().text.clone();
        let response = p.respond(&query, 3).await;

        assert!(response.valid);
        assert_eq!(response.sql, "SELECT max(budget) FROM department");
        assert_eq!(response.origin, Some(Origin::Generated));
        assert_eq!(response.contexts.len(), 2);
        assert_eq!(response.contexts[0].source_index, 1);
    }

    #[tokio::test]
    async fn llm_outage_uses_best_context_answer() {
        let p = pipeline(ScriptedLlm::failing(|| LlmError::Timeout(Duration::from_secs(1))));
        let query = p.retriever().corpus().lookup(0).unwrap().text.clone();
        let response = p.respond(&query, 1).await;

        assert!(response.valid);
        assert_eq!(response.sql, "SELECT COUNT(*) FROM head");
        assert_eq!(response.message, MSG_FALLBACK);
        assert_eq!(response.origin, Some(Origin::Fallback));
    }

    #[tokio::test]
    async fn empty_query_is_reported_inline() {
        let p = pipeline(ScriptedLlm::replying("SELECT 1"));
        let response = p.respond("   ", 3).await;
        assert!(!response.valid);
        assert_eq!(response.message, MSG_EMPTY);
        assert!(response.contexts.is_empty());
    }

    #[tokio::test]
    async fn zero_k_still_yields_a_result_object() {
        let p = pipeline(ScriptedLlm::failing(|| LlmError::Http("down".into())));
        let response = p.respond("anything", 0).await;
        assert!(response.contexts.is_empty());
        assert!(!response.valid);
        assert!(response.message.starts_with(MSG_FALLBACK));
    }

    #[tokio::test]
    async fn explain_failure_is_text_not_error() {
        let p = pipeline(ScriptedLlm::failing(|| LlmError::Auth("bad key".into())));
        let answer = p.explain("q", &[]).await;
        assert!(answer.starts_with("[Error communicating with LLM:"));
    }

    #[test]
    fn chat_directives() {
        assert_eq!(parse_chat_input("EXIT"), ChatInput::Exit);
        assert_eq!(parse_chat_input(" quit "), ChatInput::Exit);
        assert_eq!(parse_chat_input("   "), ChatInput::Blank);
        assert_eq!(parse_chat_input("k=5"), ChatInput::SetK(5));
        assert_eq!(parse_chat_input("k=-2"), ChatInput::SetK(-2));
        assert_eq!(parse_chat_input("k=lots"), ChatInput::BadK);
        assert_eq!(
            parse_chat_input("how many heads?"),
            ChatInput::Query("how many heads?".into())
        );
    }
}
