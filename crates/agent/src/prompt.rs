//! Prompt construction for the decision, beast-mode, and helper calls.
//!
//! Prompts are assembled from the diary, the windowed knowledge view, the
//! ranked URL list, and any improvement plans from failed evaluations.
//! The action contract itself travels as a schema, never as prose alone.

use crate::diary::Diary;
use crate::knowledge::KnowledgeStore;
use chrono::Utc;
use scour_core::{Permissions, UrlRecord};

/// Everything the decision prompt draws from.
pub struct PromptInputs<'a> {
    pub original: &'a str,
    pub current: &'a str,
    pub knowledge: &'a KnowledgeStore,
    pub diary: &'a Diary,
    pub urls: &'a [&'a UrlRecord],
    pub improvement_plans: &'a [String],
    pub permissions: Permissions,
    pub language: Option<&'a str>,
}

/// System + user messages for one decision step.
pub fn decide(inputs: &PromptInputs<'_>) -> (String, String) {
    let mut system = String::new();
    system.push_str(&format!(
        "Current date: {}\n\n\
         You are an advanced research agent. You answer questions by \
         iteratively gathering evidence: searching the web, reading pages, \
         breaking the question into sub-questions, and running small \
         computations. You are rigorous about grounding claims in sources.\n\n",
        Utc::now().format("%a, %d %b %Y"),
    ));
    system.push_str("Based on the current context, choose exactly one of the permitted actions:\n");
    push_action_menu(&mut system, inputs.permissions);
    system.push_str(
        "\nRespond with a single JSON object matching the provided schema. \
         Put your reasoning in the `think` field.\n",
    );
    if let Some(lang) = inputs.language {
        system.push_str(&format!("\nWrite any answer in language code `{lang}`.\n"));
    }

    let mut user = String::new();
    user.push_str(&format!("## Original question\n{}\n", inputs.original));
    if inputs.current != inputs.original {
        user.push_str(&format!("\n## Current focus\n{}\n", inputs.current));
    }
    if !inputs.knowledge.is_empty() {
        user.push_str("\n## What you have learned so far\n");
        user.push_str(&inputs.knowledge.render());
    }
    if !inputs.diary.is_empty() {
        user.push_str("\n## Actions you have taken\n");
        user.push_str(&inputs.diary.render());
        user.push('\n');
    }
    if !inputs.urls.is_empty() {
        user.push_str("\n## URLs available to visit\n");
        for rec in inputs.urls {
            user.push_str(&format!("- {} — {}: {}\n", rec.url, rec.title, rec.snippet));
        }
    }
    if !inputs.improvement_plans.is_empty() {
        user.push_str("\n## Reviewer guidance from rejected answers\n");
        for plan in inputs.improvement_plans {
            user.push_str(&format!("- {plan}\n"));
        }
    }
    user.push_str(&format!("\nDecide the next action for: {}\n", inputs.current));

    (system, user)
}

fn push_action_menu(out: &mut String, permissions: Permissions) {
    if permissions.search {
        out.push_str("- **search**: issue web search queries to discover new sources.\n");
    }
    if permissions.read {
        out.push_str("- **visit**: read the full content of URLs from the list provided.\n");
    }
    if permissions.reflect {
        out.push_str("- **reflect**: register sub-questions that must be answered first.\n");
    }
    if permissions.code {
        out.push_str("- **code**: run a small program over the collected knowledge.\n");
    }
    if permissions.answer {
        out.push_str("- **answer**: give the final answer with supporting references.\n");
    }
}

/// The single forced-answer prompt used once a termination gate fires.
/// All tool use is forbidden; the model must synthesize from what exists.
pub fn beast(inputs: &PromptInputs<'_>) -> (String, String) {
    let mut system = String::new();
    system.push_str(&format!(
        "Current date: {}\n\n\
         You are an advanced research agent out of time and budget. \
         You MUST answer now, using only the knowledge already gathered. \
         No further searching, reading, or computation is possible. \
         Commit to the best supported answer; an educated synthesis based \
         on the evidence below is required, refusal is not acceptable.\n",
        Utc::now().format("%a, %d %b %Y"),
    ));
    if let Some(lang) = inputs.language {
        system.push_str(&format!("\nWrite the answer in language code `{lang}`.\n"));
    }

    let mut user = String::new();
    user.push_str(&format!("## Question\n{}\n", inputs.original));
    if !inputs.knowledge.is_empty() {
        user.push_str("\n## Gathered evidence\n");
        user.push_str(&inputs.knowledge.render());
    }
    if !inputs.diary.is_empty() {
        user.push_str("\n## What you tried\n");
        user.push_str(&inputs.diary.render());
        user.push('\n');
    }
    user.push_str("\nAnswer the question now.\n");

    (system, user)
}

/// Prompt for the search-query rewriter sub-call.
pub fn query_rewrite(question: &str, queries: &[String]) -> (String, String) {
    let system = "You optimize web search queries. Rewrite the given queries into \
                  short, keyword-dense queries that a search engine handles well. \
                  Keep distinct intents separate; drop filler words."
        .to_string();
    let user = format!(
        "Research question: {question}\n\nDraft queries:\n{}\n\nRewrite them.",
        queries.iter().map(|q| format!("- {q}")).collect::<Vec<_>>().join("\n"),
    );
    (system, user)
}
