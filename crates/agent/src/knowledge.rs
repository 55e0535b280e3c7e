//! The session's append-only knowledge store.
//!
//! Everything learned is retained for the final result; only the most
//! recent `window` items are presented to the LLM to bound prompt growth.

use scour_core::{KnowledgeItem, KnowledgeKind};

/// Append-only log of knowledge items with a windowed LLM-facing view.
#[derive(Debug)]
pub struct KnowledgeStore {
    items: Vec<KnowledgeItem>,
    window: usize,
}

impl KnowledgeStore {
    pub fn new(window: usize) -> Self {
        Self { items: Vec::new(), window }
    }

    pub fn append(&mut self, item: KnowledgeItem) {
        self.items.push(item);
    }

    pub fn extend(&mut self, items: impl IntoIterator<Item = KnowledgeItem>) {
        self.items.extend(items);
    }

    /// The windowed view shown to the LLM: the last `window` items.
    pub fn recent(&self) -> &[KnowledgeItem] {
        let start = self.items.len().saturating_sub(self.window);
        &self.items[start..]
    }

    /// The complete log, for the final result.
    pub fn all(&self) -> &[KnowledgeItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Render the windowed view as a prompt section.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (i, item) in self.recent().iter().enumerate() {
            let tag = match item.kind {
                KnowledgeKind::QuestionAnswer => "knowledge",
                KnowledgeKind::Url => "page",
                KnowledgeKind::SideInfo => "info",
                KnowledgeKind::ErrorAnalysis => "failed attempt",
            };
            out.push_str(&format!(
                "<{tag}-{n}>\nQ: {}\nA: {}\n</{tag}-{n}>\n",
                item.question,
                item.answer,
                tag = tag,
                n = i + 1,
            ));
        }
        out
    }

    /// Snapshot for the code runner's `inputs` value.
    pub fn snapshot(&self) -> serde_json::Value {
        serde_json::json!({
            "knowledge": self.recent(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_is_windowed_all_is_not() {
        let mut store = KnowledgeStore::new(3);
        for i in 0..5 {
            store.append(KnowledgeItem::qa(format!("q{i}"), format!("a{i}")));
        }
        assert_eq!(store.recent().len(), 3);
        assert_eq!(store.recent()[0].question, "q2");
        assert_eq!(store.all().len(), 5);
    }

    #[test]
    fn render_tags_by_kind() {
        let mut store = KnowledgeStore::new(10);
        store.append(KnowledgeItem::qa("who", "them"));
        store.append(KnowledgeItem::error_analysis("why failed", "too vague"));
        let rendered = store.render();
        assert!(rendered.contains("<knowledge-1>"));
        assert!(rendered.contains("<failed attempt-2>"));
        assert!(rendered.contains("A: too vague"));
    }

    #[test]
    fn snapshot_contains_recent_items() {
        let mut store = KnowledgeStore::new(10);
        store.append(KnowledgeItem::qa("q", "a"));
        let snap = store.snapshot();
        assert_eq!(snap["knowledge"][0]["question"], "q");
    }
}
