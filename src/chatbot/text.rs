//! Text processing for incoming chat messages.

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use unicode_normalization::{char::is_combining_mark, UnicodeNormalization};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language { English, Spanish }

static STOPWORDS_EN: Lazy<HashSet<&'static str>> = Lazy::new(|| word_list(include_str!("../../resources/chatbot/stopwords_en.txt")).collect());
static STOPWORDS_ES: Lazy<HashSet<&'static str>> = Lazy::new(|| word_list(include_str!("../../resources/chatbot/stopwords_es.txt")).collect());
static DICTIONARY_EN: Lazy<Dictionary> = Lazy::new(|| Dictionary::new(include_str!("../../resources/chatbot/dictionary_en.txt")));
static DICTIONARY_ES: Lazy<Dictionary> = Lazy::new(|| Dictionary::new(include_str!("../../resources/chatbot/dictionary_es.txt")));
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\p{L}+").expect("static pattern"));

// Candidates further away than this are never suggested.
const MAX_EDIT_DISTANCE: usize = 3;

fn word_list(raw: &'static str) -> impl Iterator<Item = &'static str> {
    raw.lines().map(str::trim).filter(|w| !w.is_empty() && !w.starts_with('#') && !w.contains(' '))
}

struct Dictionary {
    words: Vec<&'static str>,
    known: HashSet<&'static str>,
    by_sound: HashMap<String, Vec<&'static str>>,
}

impl Dictionary {
    fn new(raw: &'static str) -> Self {
        let words: Vec<&'static str> = word_list(raw).collect();
        let mut by_sound: HashMap<String, Vec<&'static str>> = HashMap::new();
        for word in &words {
            by_sound.entry(phonetic_key(word)).or_default().push(word);
        }
        Self { known: words.iter().copied().collect(), words, by_sound }
    }
}

impl Language {
    fn stopwords(self) -> &'static HashSet<&'static str> {
        match self { Self::English => &STOPWORDS_EN, Self::Spanish => &STOPWORDS_ES }
    }

    fn dictionary(self) -> &'static Dictionary {
        match self { Self::English => &DICTIONARY_EN, Self::Spanish => &DICTIONARY_ES }
    }
}

/// Lowercases, strips accents and drops everything but letters, digits and whitespace.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect()
}

/// English wins only with a clear margin of English stopwords over Spanish ones.
pub fn is_english(text: &str) -> bool {
    let normalized = normalize(text);
    let (mut en, mut es) = (0usize, 0usize);
    for word in normalized.split_whitespace() {
        if STOPWORDS_EN.contains(word) { en += 1; }
        if STOPWORDS_ES.contains(word) { es += 1; }
    }
    en > es + 1
}

pub fn detect_language(text: &str) -> Language {
    if is_english(text) { Language::English } else { Language::Spanish }
}

/// Content words of an already normalized text.
pub fn tokenize(normalized: &str, language: Language) -> HashSet<String> {
    let stopwords = language.stopwords();
    normalized.split_whitespace().filter(|w| !stopwords.contains(w)).map(str::to_string).collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 { return 0.0; }
    a.intersection(b).count() as f64 / union as f64
}

/// Edit distance, or `None` once it is certain to exceed `max`.
pub fn levenshtein(a: &str, b: &str, max: usize) -> Option<usize> {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len().abs_diff(b.len()) > max { return None; }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        let mut row_min = curr[0];
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
            row_min = row_min.min(curr[j]);
        }
        if row_min > max { return None; }
        std::mem::swap(&mut prev, &mut curr);
    }
    Some(prev[b.len()]).filter(|d| *d <= max)
}

const METAPHONE_LEN: usize = 4;

/// Lawrence Philips' Metaphone code, truncated to four symbols. `0` stands
/// for the "th" sound.
pub fn phonetic_key(word: &str) -> String {
    let upper: Vec<char> = word.chars().map(|c| c.to_ascii_uppercase()).collect();
    match upper.len() {
        0 => return String::new(),
        1 => return upper.iter().collect(),
        _ => {}
    }
    let w = initial_exceptions(upper);
    let len = w.len();
    let at = |i: usize| w.get(i).copied();
    let is_vowel = |i: usize| matches!(at(i), Some('A' | 'E' | 'I' | 'O' | 'U'));
    let is_front_vowel = |i: usize| matches!(at(i), Some('E' | 'I' | 'Y'));
    let prev_is = |i: usize, c: char| i > 0 && at(i - 1) == Some(c);
    let next_is = |i: usize, c: char| at(i + 1) == Some(c);
    let is_last = |i: usize| i + 1 == len;
    let region = |i: usize, s: &str| s.chars().enumerate().all(|(k, c)| at(i + k) == Some(c));

    let mut code = String::new();
    let mut n = 0;
    while code.len() < METAPHONE_LEN && n < len {
        let symbol = w[n];
        if symbol != 'C' && prev_is(n, symbol) {
            n += 1;
            continue;
        }
        match symbol {
            'A' | 'E' | 'I' | 'O' | 'U' => if n == 0 { code.push(symbol) },
            'B' => if !(prev_is(n, 'M') && is_last(n)) { code.push('B') },
            'C' => {
                if prev_is(n, 'S') && !is_last(n) && is_front_vowel(n + 1) {
                    // silent in "sci", "sce", "scy"
                } else if region(n, "CIA") {
                    code.push('X');
                } else if !is_last(n) && is_front_vowel(n + 1) {
                    code.push('S');
                } else if prev_is(n, 'S') && next_is(n, 'H') {
                    code.push('K');
                } else if next_is(n, 'H') {
                    code.push(if n == 0 && len >= 3 && is_vowel(2) { 'K' } else { 'X' });
                } else {
                    code.push('K');
                }
            }
            'D' => {
                if !is_last(n + 1) && next_is(n, 'G') && is_front_vowel(n + 2) {
                    code.push('J');
                    n += 2;
                } else {
                    code.push('T');
                }
            }
            'G' => {
                let silent_gh = next_is(n, 'H') && (is_last(n + 1) || !is_vowel(n + 2));
                let silent_gn = n > 0 && region(n, "GN");
                if !silent_gh && !silent_gn {
                    let soft = !is_last(n) && is_front_vowel(n + 1) && !prev_is(n, 'G');
                    code.push(if soft { 'J' } else { 'K' });
                }
            }
            'H' => {
                let after_modifier = n > 0 && matches!(at(n - 1), Some('C' | 'S' | 'P' | 'T' | 'G'));
                if !is_last(n) && !after_modifier && is_vowel(n + 1) { code.push('H') }
            }
            'F' | 'J' | 'L' | 'M' | 'N' | 'R' => code.push(symbol),
            'K' => if !prev_is(n, 'C') { code.push('K') },
            'P' => code.push(if next_is(n, 'H') { 'F' } else { 'P' }),
            'Q' => code.push('K'),
            'S' => code.push(if region(n, "SH") || region(n, "SIO") || region(n, "SIA") { 'X' } else { 'S' }),
            'T' => {
                if region(n, "TIA") || region(n, "TIO") {
                    code.push('X');
                } else if !region(n, "TCH") {
                    code.push(if region(n, "TH") { '0' } else { 'T' });
                }
            }
            'V' => code.push('F'),
            'W' | 'Y' => if !is_last(n) && is_vowel(n + 1) { code.push(symbol) },
            'X' => code.push_str("KS"),
            'Z' => code.push('S'),
            _ => {}
        }
        n += 1;
    }
    code.truncate(METAPHONE_LEN);
    code
}

/// Rewrites the silent or altered openings `KN`, `GN`, `PN`, `AE`, `WR`,
/// `WH` and `X`.
fn initial_exceptions(mut w: Vec<char>) -> Vec<char> {
    match (w[0], w[1]) {
        ('K' | 'G' | 'P', 'N') | ('A', 'E') | ('W', 'R') => { w.remove(0); }
        ('W', 'H') => { w.remove(0); w[0] = 'W'; }
        ('X', _) => w[0] = 'S',
        _ => {}
    }
    w
}

/// Replaces unknown words with the closest dictionary entry.
pub fn correct_spelling(text: &str, language: Language) -> String {
    let dictionary = language.dictionary();
    WORD.replace_all(text, |caps: &Captures| {
        let word = &caps[0];
        if dictionary.known.contains(word) || STOPWORDS_EN.contains(word) || STOPWORDS_ES.contains(word) {
            return word.to_string();
        }
        best_candidate(word, dictionary).unwrap_or(word).to_string()
    })
    .into_owned()
}

fn best_candidate(word: &str, dictionary: &Dictionary) -> Option<&'static str> {
    let len = word.chars().count();
    let candidates: Vec<&'static str> = match dictionary.by_sound.get(&phonetic_key(word)) {
        Some(same_sound) => same_sound.clone(),
        None => dictionary.words.iter().copied().filter(|c| c.chars().count().abs_diff(len) <= 2).collect(),
    };

    candidates
        .into_iter()
        .filter_map(|candidate| {
            let distance = levenshtein(word, candidate, MAX_EDIT_DISTANCE)?;
            Some((score(word, candidate, distance), candidate))
        })
        .min_by_key(|(score, _)| *score)
        .map(|(_, candidate)| candidate)
        .filter(|candidate| *candidate != word)
}

fn score(word: &str, candidate: &str, distance: usize) -> i64 {
    let len_diff = word.chars().count().abs_diff(candidate.chars().count());
    let prefix = word.chars().zip(candidate.chars()).take_while(|(a, b)| a == b).count();
    let word_letters: HashSet<char> = word.chars().collect();
    let common = candidate.chars().collect::<HashSet<char>>().intersection(&word_letters).count();
    5 * distance as i64 + 3 * len_diff as i64 - 4 * prefix as i64 - 2 * common as i64
}

/// A message reduced to what the matchers look at.
#[derive(Debug, Clone)]
pub struct MessageContext {
    pub original: String,
    pub normalized: String,
    pub tokens: HashSet<String>,
    pub language: Language,
}

impl MessageContext {
    pub fn new(text: &str) -> Self { Self::build(text, true) }

    /// For trusted text such as the predefined questions.
    pub fn without_correction(text: &str) -> Self { Self::build(text, false) }

    fn build(text: &str, correct: bool) -> Self {
        let language = detect_language(text);
        let mut normalized = normalize(text);
        if correct {
            normalized = normalize(&correct_spelling(&normalized, language));
        }
        let tokens = tokenize(&normalized, language);
        Self { original: text.to_string(), normalized, tokens, language }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(words: &[&str]) -> HashSet<String> { words.iter().map(|w| w.to_string()).collect() }

    #[test]
    fn test_normalize_strips_accents_and_punctuation() {
        assert_eq!(normalize("¿Cuánto tarda el envío?"), "cuanto tarda el envio");
        assert_eq!(normalize("Diseño Nº1!"), "diseno n1");
    }

    #[test]
    fn test_language_detection() {
        assert!(is_english("How do I find my size?"));
        assert!(!is_english("¿Cómo sé cuál es mi talla?"));
        assert!(!is_english("hoodie"));
    }

    #[test]
    fn test_tokenize_drops_stopwords() {
        assert_eq!(tokenize("how long does shipping take", Language::English), set(&["long", "shipping", "take"]));
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard(&set(&["a", "b"]), &set(&["b", "c"])), 1.0 / 3.0);
        assert_eq!(jaccard(&set(&[]), &set(&[])), 0.0);
    }

    #[test]
    fn test_levenshtein_bounded() {
        assert_eq!(levenshtein("kitten", "sitting", 3), Some(3));
        assert_eq!(levenshtein("kitten", "sitting", 2), None);
        assert_eq!(levenshtein("envio", "envio", 0), Some(0));
    }

    #[test]
    fn test_phonetic_key_folds_similar_sounds() {
        assert_eq!(phonetic_key("shiping"), "XPNK");
        assert_eq!(phonetic_key("knight"), "NT");
        assert_eq!(phonetic_key("phone"), "FN");
        assert_eq!(phonetic_key("Xavier"), "SFR");
        assert_eq!(phonetic_key("shiping"), phonetic_key("shipping"));
        assert_eq!(phonetic_key("envoi"), phonetic_key("envio"));
        assert_ne!(phonetic_key("talla"), phonetic_key("envio"));
    }

    #[test]
    fn test_correct_spelling() {
        assert_eq!(correct_spelling("how long does shiping take", Language::English), "how long does shipping take");
        assert_eq!(correct_spelling("cuanto tarda el envoi", Language::Spanish), "cuanto tarda el envio");
        assert_eq!(correct_spelling("hoodie", Language::English), "hoodie");
    }

    #[test]
    fn test_context_tokens_use_corrected_text() {
        let ctx = MessageContext::new("How long does shiping take?");
        assert_eq!(ctx.language, Language::English);
        assert!(ctx.tokens.contains("shipping"));
        let raw = MessageContext::without_correction("How long does shiping take?");
        assert!(raw.tokens.contains("shiping"));
    }
}
