//! Prompt assembly and reply parsing for the verification stages.

use serde_json::Value;

use crate::context::{Contradiction, VerificationAnswer, VerificationContext};

/// Marks a question whose independent answer is missing.
pub const UNRESOLVED_MARKER: &str = "UNRESOLVED";
/// Heads the corrected answer in a revision reply.
pub const REVISED_ANSWER_MARKER: &str = "REVISED ANSWER:";
/// Heads the list of corrections in a revision reply.
pub const CHANGES_MARKER: &str = "CHANGES:";

/// Parsed reply of the REVISE stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
    /// The corrected answer
    pub answer: String,
    /// One entry per listed change
    pub contradictions: Vec<Contradiction>,
}

/// Builds stage prompts and parses stage replies.
pub struct PromptAssembler;

impl PromptAssembler {
    /// Ask the model to decompose a baseline answer into verification
    /// questions, one per checkable claim.
    pub fn plan_prompt(query: &str, baseline: &str, max_questions: usize) -> String {
        let mut prompt = String::new();

        prompt.push_str("# VERIFICATION PLANNING\n\n");
        prompt.push_str("Based on the following user query and bot response, generate a list of questions to verify the factual claims in the response.\n\n");
        prompt.push_str(&format!("User query: {query}\n\n"));
        prompt.push_str(&format!("Bot response: {baseline}\n\n"));

        prompt.push_str("## Rules\n\n");
        prompt.push_str("1. Write one question per independently checkable factual claim\n");
        prompt.push_str("2. Each question must be answerable on its own, without seeing the response\n");
        prompt.push_str(&format!("3. Write at most {max_questions} questions\n"));
        prompt.push_str("4. If the response makes no factual claims, return an empty list\n\n");

        prompt.push_str("Return a JSON array of strings, for example:\n");
        prompt.push_str("[\"When was the Eiffel Tower completed?\"]\n\n");
        prompt.push_str("Verification Questions:\n");

        prompt
    }

    /// Ask the model to correct the baseline against the independent answers.
    ///
    /// Unresolved answers are marked so the model neither trusts nor
    /// invents them.
    pub fn revise_prompt(context: &VerificationContext) -> String {
        let mut prompt = String::new();

        prompt.push_str("# VERIFICATION REVIEW\n\n");
        prompt.push_str(&format!("Original query: {}\n\n", context.query));
        prompt.push_str(&format!("Initial response: {}\n\n", context.baseline));

        prompt.push_str("## Verification Q&A\n\n");
        prompt.push_str("Each question below was answered independently, without access to the initial response.\n\n");

        for (i, (question, answer)) in context.pairs().enumerate() {
            prompt.push_str(&format!("{}. Q: {}\n", i + 1, question));
            match answer {
                VerificationAnswer::Resolved { text } => {
                    prompt.push_str(&format!("   A: {}\n", text.trim()));
                }
                VerificationAnswer::Unresolved { reason } => {
                    prompt.push_str(&format!(
                        "   A: {UNRESOLVED_MARKER} (could not be verified: {reason})\n"
                    ));
                }
            }
        }

        prompt.push_str("\n## Instructions\n\n");
        prompt.push_str("Generate a final, verified response to the original query.\n");
        prompt.push_str("Correct every claim in the initial response that the answers contradict.\n");
        prompt.push_str(&format!(
            "Do not change claims whose only check is {UNRESOLVED_MARKER}.\n\n"
        ));

        prompt.push_str("Respond in exactly this format:\n\n");
        prompt.push_str(&format!("{REVISED_ANSWER_MARKER}\n<the final response>\n\n"));
        prompt.push_str(&format!("{CHANGES_MARKER}\n"));
        prompt.push_str("- <original claim> -> <corrected claim> (reason: <why>)\n\n");
        prompt.push_str(&format!("Write \"- none\" under {CHANGES_MARKER} if nothing changed.\n"));

        prompt
    }

    /// Extract verification questions from a planning reply.
    ///
    /// Accepts a JSON array of strings, an object with a `questions` array,
    /// or plain text with one question per line. In plain text only lines
    /// ending in `?` count, with list bullets and numbering removed.
    pub fn parse_questions(reply: &str) -> Vec<String> {
        let body = strip_code_fence(reply);

        if let Ok(value) = serde_json::from_str::<Value>(body) {
            let items = match &value {
                Value::Array(items) => Some(items),
                Value::Object(map) => map.get("questions").and_then(Value::as_array),
                _ => None,
            };
            if let Some(items) = items {
                return items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::trim)
                    .filter(|q| !q.is_empty())
                    .map(str::to_string)
                    .collect();
            }
        }

        body.lines()
            .map(strip_list_marker)
            .filter(|line| line.len() > 1 && line.ends_with('?'))
            .map(str::to_string)
            .collect()
    }

    /// Parse a revision reply.
    ///
    /// Returns `None` when the reply holds no answer text.
    pub fn parse_revision(reply: &str) -> Option<Revision> {
        // ASCII uppercasing keeps byte offsets valid for `reply`.
        let upper = reply.to_ascii_uppercase();

        let answer_start = upper
            .find(REVISED_ANSWER_MARKER)
            .map(|i| i + REVISED_ANSWER_MARKER.len())
            .unwrap_or(0);
        let changes_at = find_at_line_start(&upper, answer_start, CHANGES_MARKER);

        let answer = match changes_at {
            Some((end, _)) => &reply[answer_start..end],
            None => &reply[answer_start..],
        }
        .trim();

        if answer.is_empty() {
            return None;
        }

        let contradictions = changes_at
            .map(|(_, body)| {
                reply[body..]
                    .lines()
                    .filter_map(parse_change)
                    .collect()
            })
            .unwrap_or_default();

        Some(Revision {
            answer: answer.to_string(),
            contradictions,
        })
    }
}

/// Locate `marker` where it opens a line at or after `from`, returning the
/// offset of that line and the offset just past the marker.
///
/// Leading whitespace and markdown emphasis (`**`, `#`) before the marker
/// are allowed; a marker inside prose is not.
fn find_at_line_start(text: &str, from: usize, marker: &str) -> Option<(usize, usize)> {
    let mut offset = from;
    for line in text[from..].split_inclusive('\n') {
        let at_line_start = offset == 0 || text.as_bytes()[offset - 1] == b'\n';
        let lead = line.len()
            - line
                .trim_start_matches(|c: char| c.is_whitespace() || c == '*' || c == '#')
                .len();
        if at_line_start && line[lead..].starts_with(marker) {
            return Some((offset, offset + lead + marker.len()));
        }
        offset += line.len();
    }
    None
}

/// `- <original> -> <corrected> (reason: <why>)`
fn parse_change(line: &str) -> Option<Contradiction> {
    let line = line.trim().strip_prefix('-').or_else(|| line.trim().strip_prefix('*'))?;
    let (original, rest) = line.split_once("->")?;

    let rest = rest.trim();
    let (corrected, reason) = match rest.rfind("(reason:") {
        Some(i) => (
            &rest[..i],
            rest[i + "(reason:".len()..].trim_end_matches(')'),
        ),
        None => (rest, ""),
    };

    let original = original.trim();
    let corrected = corrected.trim();
    if original.is_empty() || corrected.is_empty() {
        return None;
    }

    Some(Contradiction {
        original: original.to_string(),
        corrected: corrected.to_string(),
        reason: reason.trim().to_string(),
    })
}

fn strip_code_fence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an info string such as `json`.
    let inner = inner.split_once('\n').map(|(_, body)| body).unwrap_or(inner);
    inner.trim_end().trim_end_matches("```").trim()
}

fn strip_list_marker(line: &str) -> &str {
    let line = line.trim();

    if let Some(rest) = line
        .strip_prefix('-')
        .or_else(|| line.strip_prefix('*'))
        .or_else(|| line.strip_prefix('•'))
    {
        return rest.trim_start();
    }

    let digits = line.bytes().take_while(u8::is_ascii_digit).count();
    if digits > 0 {
        if let Some(rest) = line[digits..]
            .strip_prefix('.')
            .or_else(|| line[digits..].strip_prefix(')'))
        {
            return rest.trim_start();
        }
    }

    line
}
