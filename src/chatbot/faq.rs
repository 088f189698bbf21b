//! Predefined questions and answers.

use std::collections::BTreeMap;

use crate::chatbot::text::{jaccard, MessageContext};

const BUILTIN: &str = include_str!("../../resources/chatbot/predefined_qa.json");

#[derive(Debug, Clone)]
pub struct QaEntry {
    pub question: String,
    pub answer: String,
    context: MessageContext,
}

#[derive(Debug, Clone)]
pub struct QaRepository {
    entries: Vec<QaEntry>,
}

impl QaRepository {
    pub fn builtin() -> Result<Self, serde_json::Error> { Self::parse(BUILTIN) }

    /// Parses a JSON object of question → answer.
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, String> = serde_json::from_str(json)?;
        let entries = raw
            .into_iter()
            .map(|(question, answer)| QaEntry { context: MessageContext::without_correction(&question), question, answer })
            .collect();
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize { self.entries.len() }
    pub fn is_empty(&self) -> bool { self.entries.is_empty() }

    /// Entry whose question shares the most words with the message, if the
    /// overlap reaches `threshold`. Equal scores go to the question closest
    /// in length to the message.
    pub fn best_match(&self, message: &MessageContext, threshold: f64) -> Option<&QaEntry> {
        let length = message.original.chars().count();
        let mut best: Option<(f64, usize, &QaEntry)> = None;
        for entry in &self.entries {
            let similarity = jaccard(&message.tokens, &entry.context.tokens);
            if similarity < threshold { continue; }
            let gap = entry.question.chars().count().abs_diff(length);
            best = match best {
                Some((s, g, _)) if similarity < s || (similarity == s && gap >= g) => best,
                _ => Some((similarity, gap, entry)),
            };
        }
        best.map(|(_, _, entry)| entry)
    }
}
