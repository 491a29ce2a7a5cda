//! Transcript normalization: SRT cleanup and paragraph shaping.

use std::sync::OnceLock;

use regex::Regex;

/// `HH:MM:SS[,.:]mmm --> HH:MM:SS[,.:]mmm`
fn srt_timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d{2}:\d{2}:\d{2}[,.:]\d{3}\s*-->\s*\d{2}:\d{2}:\d{2}[,.:]\d{3}")
            .expect("invalid SRT regex")
    })
}

/// Whether the ASR output looks like SRT subtitles.
pub fn is_srt(text: &str) -> bool {
    srt_timestamp_regex().is_match(text)
}

/// Strip SRT sequence numbers and timestamps, joining cue text into
/// paragraphs with a soft break roughly every five sentence ends.
pub fn clean_srt(text: &str) -> String {
    let mut cues: Vec<&str> = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.chars().all(|c| c.is_ascii_digit()) {
            continue; // sequence number
        }
        if srt_timestamp_regex().is_match(line) {
            continue;
        }
        cues.push(line);
    }
    into_paragraphs(&cues.join(" "))
}

/// Soft paragraph break every ≈5 sentence-ending punctuation marks.
pub fn into_paragraphs(text: &str) -> String {
    const SENTENCES_PER_PARAGRAPH: usize = 5;

    let mut out = String::with_capacity(text.len());
    let mut sentence_ends = 0;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        out.push(c);
        if matches!(c, '.' | '!' | '?') {
            // Only count it as a sentence end when followed by whitespace,
            // so "3.5" or "U.S." stay intact more often than not.
            if chars.peek().map(|n| n.is_whitespace()).unwrap_or(true) {
                sentence_ends += 1;
                if sentence_ends >= SENTENCES_PER_PARAGRAPH {
                    sentence_ends = 0;
                    // Swallow following spaces and break the paragraph.
                    while chars.peek().map(|n| *n == ' ').unwrap_or(false) {
                        chars.next();
                    }
                    if chars.peek().is_some() {
                        out.push_str("\n\n");
                    }
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SRT_SAMPLE: &str = "\
1
00:00:00,000 --> 00:00:04,500
Welcome back to the show.

2
00:00:04,500 --> 00:00:09,120
Today we talk about archives.

3
00:00:09.120 --> 00:00:12.000
Let's get into it.
";

    #[test]
    fn srt_is_detected() {
        assert!(is_srt(SRT_SAMPLE));
        assert!(is_srt("00:01:02:500 --> 00:01:04:900\nvariant separators"));
        assert!(!is_srt("Just a plain transcript without timestamps."));
    }

    #[test]
    fn clean_srt_drops_numbers_and_timestamps() {
        let cleaned = clean_srt(SRT_SAMPLE);
        assert!(!cleaned.contains("-->"));
        assert!(!cleaned.contains("00:00"));
        assert!(cleaned.contains("Welcome back to the show."));
        assert!(cleaned.contains("Today we talk about archives."));
        assert!(cleaned.contains("Let's get into it."));
    }

    #[test]
    fn paragraphs_break_about_every_five_sentences() {
        let text = (0..12)
            .map(|i| format!("Sentence number {i}."))
            .collect::<Vec<_>>()
            .join(" ");
        let shaped = into_paragraphs(&text);
        let paragraphs: Vec<&str> = shaped.split("\n\n").collect();
        assert_eq!(paragraphs.len(), 3); // 5 + 5 + 2
    }

    #[test]
    fn decimals_do_not_break_paragraphs() {
        let text = "The value was 3.5 million. Second. Third. Fourth. Fifth. Sixth.";
        let shaped = into_paragraphs(text);
        // "3.5" must not count as a sentence end: the break comes after
        // "Fifth.", not "Fourth.".
        assert!(shaped.contains("Fifth.\n\nSixth."));
    }

    #[test]
    fn no_trailing_break_at_end() {
        let text = "One. Two. Three. Four. Five.";
        let shaped = into_paragraphs(text);
        assert!(!shaped.ends_with('\n'));
    }
}
