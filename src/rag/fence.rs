//! Pull SQL out of a model response that may wrap it in Markdown fences.
//!
//! Three cases, in priority order:
//! - a block tagged `sql` (any case) anywhere in the response: its body;
//! - otherwise the first fenced block: its body, minus a one-word info string;
//! - otherwise the whole response.
//!
//! Fence markers pair up left to right. An odd number of markers means the
//! fencing is unbalanced and the whole response is used.

const FENCE: &str = "```";

pub fn extract_sql(response: &str) -> String {
    let text = response.trim();

    let marks: Vec<usize> = text.match_indices(FENCE).map(|(i, _)| i).collect();
    if marks.is_empty() || marks.len() % 2 != 0 {
        return text.to_string();
    }

    let blocks: Vec<&str> = marks
        .chunks_exact(2)
        .map(|pair| &text[pair[0] + FENCE.len()..pair[1]])
        .collect();

    if let Some(body) = blocks.iter().find_map(|b| sql_tagged_body(b)) {
        return body.trim().to_string();
    }
    strip_info_string(blocks[0]).trim().to_string()
}

fn sql_tagged_body(block: &str) -> Option<&str> {
    let tag = block.get(..3)?;
    if !tag.eq_ignore_ascii_case("sql") {
        return None;
    }
    let rest = &block[3..];
    match rest.chars().next() {
        None => Some(rest),
        Some(c) if c.is_whitespace() => Some(rest),
        Some(_) => None,
    }
}

fn strip_info_string(block: &str) -> &str {
    match block.split_once('\n') {
        Some((first, rest)) if !first.trim().contains(char::is_whitespace) => rest,
        _ => block,
    }
}
