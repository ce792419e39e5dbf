use tracing::debug;

use super::sanitize::sanitize;
use crate::history::{HistoryEntry, Speaker};

/// The in-progress transcript of the current turn
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptBuffer {
    pub text: String,
    pub speaker: Option<Speaker>,
}

impl TranscriptBuffer {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Accumulates streamed transcript fragments into per-turn text
///
/// Only one speaker's partial transcript is tracked at a time. A fragment from
/// a different speaker replaces the buffer; whatever the previous speaker said
/// since the last turn boundary is discarded.
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    buffer: TranscriptBuffer,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw fragment from `speaker`
    ///
    /// Returns false when the fragment sanitizes to nothing.
    pub fn append(&mut self, speaker: Speaker, raw_fragment: &str) -> bool {
        let fragment = sanitize(raw_fragment);
        if fragment.is_empty() {
            return false;
        }

        if self.buffer.speaker == Some(speaker) {
            if !self.buffer.text.is_empty() {
                self.buffer.text.push(' ');
            }
            self.buffer.text.push_str(&fragment);
        } else {
            if !self.buffer.is_empty() {
                debug!(
                    "Speaker switched {:?} -> {} before turn end, dropping {} chars",
                    self.buffer.speaker,
                    speaker,
                    self.buffer.text.len()
                );
            }
            self.buffer = TranscriptBuffer {
                text: fragment,
                speaker: Some(speaker),
            };
        }

        true
    }

    /// Finalize the current turn
    ///
    /// Returns the entry to record, if the buffer held any text. The buffer is
    /// reset either way.
    pub fn flush_on_turn_complete(&mut self) -> Option<HistoryEntry> {
        let buffer = std::mem::take(&mut self.buffer);

        match buffer.speaker {
            Some(speaker) if !buffer.is_empty() => {
                Some(HistoryEntry::new(buffer.text.trim(), speaker))
            }
            _ => None,
        }
    }

    /// The in-progress turn, for display
    pub fn current(&self) -> &TranscriptBuffer {
        &self.buffer
    }

    pub fn reset(&mut self) {
        self.buffer = TranscriptBuffer::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_speaker_fragments_joined_with_space() {
        let mut agg = TranscriptAggregator::new();
        agg.append(Speaker::Assistant, "Hello");
        agg.append(Speaker::Assistant, "there.");

        let entry = agg.flush_on_turn_complete().unwrap();
        assert_eq!(entry.text, "Hello there.");
        assert_eq!(entry.speaker, Speaker::Assistant);
        assert!(entry.complete);
    }

    #[test]
    fn test_speaker_switch_supersedes() {
        let mut agg = TranscriptAggregator::new();
        agg.append(Speaker::User, "a");
        agg.append(Speaker::Assistant, "b");

        let entry = agg.flush_on_turn_complete().unwrap();
        assert_eq!(entry.text, "b");
        assert_eq!(entry.speaker, Speaker::Assistant);
        assert!(agg.flush_on_turn_complete().is_none());
    }

    #[test]
    fn test_empty_fragments_ignored() {
        let mut agg = TranscriptAggregator::new();
        assert!(!agg.append(Speaker::User, "  [inaudible] <<noise>> "));
        assert_eq!(agg.current(), &TranscriptBuffer::default());
    }

    #[test]
    fn test_empty_fragment_does_not_switch_speaker() {
        let mut agg = TranscriptAggregator::new();
        agg.append(Speaker::User, "keep me");
        agg.append(Speaker::Assistant, "[silence]");

        let entry = agg.flush_on_turn_complete().unwrap();
        assert_eq!(entry.text, "keep me");
        assert_eq!(entry.speaker, Speaker::User);
    }

    #[test]
    fn test_flush_resets_even_when_empty() {
        let mut agg = TranscriptAggregator::new();
        assert!(agg.flush_on_turn_complete().is_none());
        assert!(agg.current().speaker.is_none());
    }

    #[test]
    fn test_fragments_are_sanitized() {
        let mut agg = TranscriptAggregator::new();
        agg.append(Speaker::User, "<<AudioTranscription: x>> turn on");
        agg.append(Speaker::User, "the lights [noise]");

        assert_eq!(agg.current().text, "turn on the lights");
    }
}
