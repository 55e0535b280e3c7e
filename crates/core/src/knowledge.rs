//! Knowledge items — the append-only facts a session accumulates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What kind of fact a knowledge item records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KnowledgeKind {
    /// A question the agent asked and the answer it found.
    QuestionAnswer,
    /// Content extracted from a visited URL.
    Url,
    /// Incidental information picked up along the way.
    SideInfo,
    /// Why a previous answer attempt failed. Survives diary resets.
    ErrorAnalysis,
}

/// One entry in the session's append-only knowledge log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeItem {
    pub question: String,
    pub answer: String,
    pub kind: KnowledgeKind,
    pub timestamp: DateTime<Utc>,
}

impl KnowledgeItem {
    fn new(question: impl Into<String>, answer: impl Into<String>, kind: KnowledgeKind) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn qa(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self::new(question, answer, KnowledgeKind::QuestionAnswer)
    }

    pub fn url(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self::new(question, answer, KnowledgeKind::Url)
    }

    pub fn side_info(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self::new(question, answer, KnowledgeKind::SideInfo)
    }

    pub fn error_analysis(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self::new(question, answer, KnowledgeKind::ErrorAnalysis)
    }
}
