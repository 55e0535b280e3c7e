//! The gap queue — the original question plus sub-questions discovered
//! through reflection, drained by round-robin selection.

/// Queue of open questions. The original is always present at index 0.
#[derive(Debug)]
pub struct GapQueue {
    questions: Vec<String>,
}

impl GapQueue {
    pub fn new(original: impl Into<String>) -> Self {
        Self { questions: vec![original.into()] }
    }

    pub fn original(&self) -> &str {
        &self.questions[0]
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn all(&self) -> &[String] {
        &self.questions
    }

    /// Round-robin selection: `questions[total_step mod len]`.
    pub fn select(&self, total_step: u32) -> &str {
        &self.questions[total_step as usize % self.questions.len()]
    }

    pub fn is_original(&self, question: &str) -> bool {
        self.questions[0] == question
    }

    /// Append a sub-question unless it duplicates an existing one
    /// (token-Jaccard similarity at or above `threshold`).
    /// Returns whether it was added.
    pub fn push_unique(&mut self, question: &str, threshold: f64) -> bool {
        let question = question.trim();
        if question.is_empty() {
            return false;
        }
        if self.questions.iter().any(|q| similarity(q, question) >= threshold) {
            return false;
        }
        self.questions.push(question.to_string());
        true
    }
}

/// Normalized token Jaccard similarity in [0, 1].
pub fn similarity(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() && tb.is_empty() {
        return 1.0;
    }
    let intersection = ta.iter().filter(|t| tb.contains(*t)).count();
    let union = ta.len() + tb.len() - intersection;
    if union == 0 {
        return 1.0;
    }
    intersection as f64 / union as f64
}

fn tokens(s: &str) -> std::collections::HashSet<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn original_always_present() {
        let gaps = GapQueue::new("who wrote the rust book?");
        assert_eq!(gaps.original(), "who wrote the rust book?");
        assert_eq!(gaps.len(), 1);
    }

    #[test]
    fn round_robin_selection() {
        let mut gaps = GapQueue::new("q0");
        gaps.push_unique("when did the rust book first publish", 0.8);
        gaps.push_unique("what chapters does the rust book cover", 0.8);
        assert_eq!(gaps.select(0), "q0");
        assert_eq!(gaps.select(1), "when did the rust book first publish");
        assert_eq!(gaps.select(2), "what chapters does the rust book cover");
        assert_eq!(gaps.select(3), "q0");
    }

    #[test]
    fn near_duplicates_rejected() {
        let mut gaps = GapQueue::new("who wrote the rust book?");
        assert!(!gaps.push_unique("Who wrote the Rust book", 0.8));
        assert!(gaps.push_unique("when was the rust book published?", 0.8));
        assert_eq!(gaps.len(), 2);
    }

    #[test]
    fn empty_questions_rejected() {
        let mut gaps = GapQueue::new("q");
        assert!(!gaps.push_unique("   ", 0.8));
        assert_eq!(gaps.len(), 1);
    }

    #[test]
    fn similarity_ignores_case_and_punctuation() {
        assert!(similarity("Who wrote it?", "who wrote it") > 0.99);
        assert!(similarity("rust ownership model", "python packaging tools") < 0.2);
    }
}
