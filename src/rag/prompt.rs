use crate::corpus::store::Chunk;

const INSTRUCTION: &str = "You are a SQL expert. Given these schemas and examples, \
generate a single SQL SELECT statement. Output only the SQL query and nothing else.\n";

/// Few-shot SQL prompt. Contexts are taken in the given order; each schema text
/// is cut to the remaining character budget, and no further context is added
/// once `max_context_chars` characters of schema text have been used.
/// Example answers do not count against the budget.
pub fn build_prompt(question: &str, contexts: &[Chunk], max_context_chars: usize) -> String {
    let mut lines: Vec<String> = vec![INSTRUCTION.to_string()];
    let mut used = 0usize;

    for ctx in contexts {
        if used >= max_context_chars {
            break;
        }
        let remaining = max_context_chars - used;
        // Hard cut on characters, not bytes and not words.
        let text: String = ctx.text.chars().take(remaining).collect();
        used += text.chars().count();
        lines.push(format!("Schema: {text}"));
        lines.push(format!("Example: {}", ctx.answer));
        lines.push(String::new());
    }

    lines.push(format!("User question: {question}"));
    lines.push("SQL:".to_string());
    lines.join("\n")
}

/// Prompt for the plain-language answer shown next to the generated SQL.
pub fn build_explain_prompt(question: &str, contexts: &[Chunk]) -> String {
    let context_text = contexts
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n");
    format!("Use the following context to answer the question:\n{context_text}\nQuestion: {question}")
}
