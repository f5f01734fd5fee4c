//! Streaming sentence-boundary detection with abbreviation exceptions.
//!
//! Lets the chat driver hand completed sentences to TTS before the model has
//! finished generating the rest of its reply.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static SENTENCE_END: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]\s+").unwrap());

/// Abbreviations whose trailing punctuation must not be treated as a
/// sentence boundary.
pub fn default_abbreviations() -> HashSet<&'static str> {
    [
        "t.d.", "o.s.frv.", "þ.e.", "m.a.", "o.fl.", "þ.m.t.", "kr.", "nr.", "dr.", "hr.", "fru.",
        "st.",
    ]
    .into_iter()
    .collect()
}

fn is_abbreviation_ending(text: &str, abbreviations: &HashSet<&str>) -> bool {
    let lowered = text.to_lowercase();
    let trimmed = lowered.trim_end();
    abbreviations.iter().any(|abbr| trimmed.ends_with(abbr))
}

/// Extract every complete sentence from `text`, returning the sentences found
/// and whatever incomplete remainder is left in the buffer.
///
/// A match is a non-boundary when the text up to and including the
/// punctuation ends with a configured abbreviation; in that case the text is
/// glued to the next genuine sentence rather than split.
pub fn extract_sentences(text: &str, abbreviations: &HashSet<&str>) -> (Vec<String>, String) {
    let mut sentences = Vec::new();
    let mut remaining = text.to_string();

    loop {
        let Some(m) = SENTENCE_END.find(&remaining) else { break };
        let end_pos = m.start() + 1; // position just past the punctuation
        let candidate = remaining[..end_pos].to_string();

        if is_abbreviation_ending(&candidate, abbreviations) {
            let next_search_start = m.end();
            let after = &remaining[next_search_start..];
            if SENTENCE_END.find(after).is_none() {
                break;
            }
            let (sub_sentences, sub_remaining) = extract_sentences(after, abbreviations);
            if !sub_sentences.is_empty() {
                let mut combined = vec![format!("{} {}", candidate, sub_sentences[0])];
                combined.extend(sub_sentences[1..].iter().cloned());
                sentences.extend(combined);
                remaining = sub_remaining;
            }
            break;
        } else {
            let sentence = candidate.trim().to_string();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            remaining = remaining[m.end()..].to_string();
        }
    }

    (sentences, remaining)
}

/// Rolling accumulator the chat driver feeds deltas into as they stream in.
pub struct SentenceSegmenter {
    buffer: String,
    abbreviations: HashSet<&'static str>,
}

impl SentenceSegmenter {
    pub fn new() -> Self {
        Self { buffer: String::new(), abbreviations: default_abbreviations() }
    }

    /// Feed a text delta; returns any sentences that became complete.
    pub fn push(&mut self, delta: &str) -> Vec<String> {
        self.buffer.push_str(delta);
        let (sentences, remaining) = extract_sentences(&self.buffer, &self.abbreviations);
        self.buffer = remaining;
        sentences
    }

    /// Flush whatever remains in the buffer as a final sentence, if non-empty.
    pub fn finish(&mut self) -> Option<String> {
        let trimmed = self.buffer.trim();
        if trimmed.is_empty() {
            None
        } else {
            let sentence = trimmed.to_string();
            self.buffer.clear();
            Some(sentence)
        }
    }
}

impl Default for SentenceSegmenter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_string_yields_nothing() {
        let abbr = default_abbreviations();
        let (sentences, remaining) = extract_sentences("", &abbr);
        assert!(sentences.is_empty());
        assert!(remaining.is_empty());
    }

    #[test]
    fn simple_sentence_is_detected() {
        let abbr = default_abbreviations();
        let (sentences, remaining) = extract_sentences("Halló. ", &abbr);
        assert_eq!(sentences, vec!["Halló.".to_string()]);
        assert!(remaining.is_empty());
    }

    #[test]
    fn abbreviation_does_not_split_sentence() {
        let mut seg = SentenceSegmenter::new();
        let mut out = seg.push("Þetta er t.d. ");
        out.extend(seg.push("mjög gott. "));
        assert_eq!(out, vec!["Þetta er t.d. mjög gott.".to_string()]);
    }

    #[test]
    fn final_flush_emits_remainder() {
        let mut seg = SentenceSegmenter::new();
        seg.push("incomplete sentence without terminator");
        assert_eq!(
            seg.finish().as_deref(),
            Some("incomplete sentence without terminator")
        );
        assert!(seg.finish().is_none());
    }

    #[test]
    fn multiple_sentences_in_one_delta() {
        let abbr = default_abbreviations();
        let (sentences, remaining) = extract_sentences("One. Two. Three", &abbr);
        assert_eq!(sentences, vec!["One.".to_string(), "Two.".to_string()]);
        assert_eq!(remaining, "Three");
    }
}
