//! Prompt assembly for the answering model, and the messages shown instead of an
//! answer when retrieval came back empty.

use crate::retriever::{Outcome, Retrieval};

const ANSWER_TEMPLATE: &str = "\
You are a helpful teaching assistant for {{ course }}.
Answer the following question based on the provided context.

Context:
{{ context }}

Question:
{{ question }}
{{ note }}
Guidelines:
1. Answer based only on the provided context
2. If context is insufficient, say so clearly
3. Format dates like 24 March 2025 instead of 2025-03-24
4. Keep responses concise but complete
5. For assignments, include due dates and points
6. For announcements, include post dates
7. Use bullet points for lists
8. Cite specific context numbers when possible
9. Always mention the section where information was found

Answer:";

pub const NO_RELEVANT_CONTENT: &str =
    "I couldn't find any relevant information in this course to answer your question.";

/// What to do with a retrieval: ask the model, or tell the user directly.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Prompt(String),
    Message(String),
}

/// User-facing message for an empty retrieval, `None` when there is context to answer from.
pub fn empty_message(retrieval: &Retrieval) -> Option<String> {
    match retrieval.outcome() {
        Outcome::NoRelevantContent => Some(NO_RELEVANT_CONTENT.to_string()),
        Outcome::NoContentInTimeframe => Some(format!(
            "There is no course content in that timeframe ({}).",
            retrieval.scope
        )),
        Outcome::Found | Outcome::Partial { .. } => None,
    }
}

/// Builds the prompt, or the direct message when there is nothing to answer from.
pub fn prepare(question: &str, course: Option<&str>, retrieval: &Retrieval) -> Reply {
    match empty_message(retrieval) {
        Some(message) => Reply::Message(message),
        None => Reply::Prompt(build_prompt(question, course, retrieval)),
    }
}

/// Renders the answer template with numbered, dated context blocks.
pub fn build_prompt(question: &str, course: Option<&str>, retrieval: &Retrieval) -> String {
    let context = retrieval
        .hits
        .iter()
        .map(|hit| format!("Context {}:\n{}", hit.rank, context_block(&hit.segment)))
        .collect::<Vec<_>>()
        .join("\n\n");

    let note = match retrieval.outcome() {
        Outcome::Partial { requested, found } => format!(
            "\nNote: the question asks for {requested} items but only {found} dated item(s) exist. Say so in the answer.\n"
        ),
        _ => String::new(),
    };

    render(
        ANSWER_TEMPLATE,
        &[
            ("course", course.unwrap_or("a university course")),
            ("context", &context),
            ("question", question.trim()),
            ("note", &note),
        ],
    )
}

fn context_block(segment: &crate::chunks::Segment) -> String {
    let mut header = format!("[{}", segment.section);
    if let Some(title) = &segment.title {
        header.push_str(": ");
        header.push_str(title);
    }
    if let Some(ts) = segment.timestamp {
        header.push_str(&format!(", dated {}", ts.format("%Y-%m-%d")));
    }
    header.push(']');
    format!("{header}\n{}", segment.text.trim())
}

/// Replaces `{{ key }}` placeholders in one pass over `template`, so substituted
/// values are never rescanned. Unknown keys are left as written.
fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open..].find("}}").map(|c| open + c) else {
            break;
        };
        out.push_str(&rest[..open]);
        let key = rest[open + 2..close].trim();
        match vars.iter().find(|(k, _)| *k == key) {
            Some((_, value)) => out.push_str(value),
            None => out.push_str(&rest[open..close + 2]),
        }
        rest = &rest[close + 2..];
    }
    out.push_str(rest);
    out
}
