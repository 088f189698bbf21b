//! Keyword intents answered from the catalog instead of the language model.

use serde::Deserialize;

use crate::chatbot::text::Language;

const BUILTIN: &str = include_str!("../../resources/chatbot/intents.json");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Recommendation,
    BestSeller,
}

#[derive(Debug, Clone, Deserialize)]
struct Phrases {
    es: Vec<String>,
    en: Vec<String>,
}

impl Phrases {
    fn for_language(&self, language: Language) -> &[String] {
        match language { Language::English => &self.en, Language::Spanish => &self.es }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct IntentDetector {
    recommendation: Phrases,
    bestseller: Phrases,
}

impl IntentDetector {
    pub fn builtin() -> Result<Self, serde_json::Error> { serde_json::from_str(BUILTIN) }

    /// Checks a normalized message. Recommendations take precedence.
    pub fn detect(&self, normalized: &str, language: Language) -> Option<Intent> {
        let hit = |phrases: &Phrases| phrases.for_language(language).iter().any(|p| normalized.contains(p.as_str()));
        if hit(&self.recommendation) {
            Some(Intent::Recommendation)
        } else if hit(&self.bestseller) {
            Some(Intent::BestSeller)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_each_intent_per_language() {
        let detector = IntentDetector::builtin().unwrap();
        assert_eq!(detector.detect("can you recommend me something", Language::English), Some(Intent::Recommendation));
        assert_eq!(detector.detect("recomiendame algo", Language::Spanish), Some(Intent::Recommendation));
        assert_eq!(detector.detect("what is your best seller", Language::English), Some(Intent::BestSeller));
        assert_eq!(detector.detect("cual es el producto mas vendido", Language::Spanish), Some(Intent::BestSeller));
        assert_eq!(detector.detect("hola", Language::Spanish), None);
    }

    #[test]
    fn test_recommendation_wins_over_bestseller() {
        let detector = IntentDetector::builtin().unwrap();
        assert_eq!(detector.detect("can you recommend the best seller", Language::English), Some(Intent::Recommendation));
    }

    #[test]
    fn test_phrases_only_match_their_language() {
        let detector = IntentDetector::builtin().unwrap();
        assert_eq!(detector.detect("recomiendame algo", Language::English), None);
    }
}
