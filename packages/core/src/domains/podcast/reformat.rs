//! LLM transcript reformatting.
//!
//! Raw ASR output is one long run of text. Chunks of ≤15k chars are sent to
//! the text model to be shaped into flowing paragraphs; a failed chunk
//! comes back unchanged so the pipeline never loses transcript content.

use ollama_client::{ChatRequest, Message, OllamaClient};
use tracing::{debug, warn};

/// Transcripts shorter than this are left as-is.
pub const MIN_REFORMAT_CHARS: usize = 500;
/// Upper bound per model request.
pub const MAX_CHUNK_CHARS: usize = 15_000;

const REFORMAT_TEMPERATURE: f32 = 0.3;

/// Split text into chunks of at most `max_chars`, preferring paragraph
/// boundaries, then sentence boundaries, then a hard cut.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.chars().count() > max_chars {
        let byte_limit = char_boundary(rest, max_chars);
        let window = &rest[..byte_limit];

        let cut = window
            .rfind("\n\n")
            .map(|i| i + 2)
            .or_else(|| {
                window
                    .rmatch_indices(['.', '!', '?'])
                    .next()
                    .map(|(i, _)| i + 1)
            })
            .filter(|&i| i > 0)
            .unwrap_or(byte_limit);

        chunks.push(rest[..cut].trim().to_string());
        rest = &rest[cut..];
    }
    let tail = rest.trim();
    if !tail.is_empty() {
        chunks.push(tail.to_string());
    }
    chunks
}

fn char_boundary(s: &str, chars: usize) -> usize {
    s.char_indices()
        .nth(chars)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

fn reformat_prompt(spelling_hints: &[String]) -> String {
    let mut prompt = String::from(
        "Reformat this raw podcast transcript excerpt into flowing paragraphs of 4-6 sentences. \
         Remove filler words (um, uh, you know, like) but keep every substantive statement, \
         including sponsor reads. Do not summarize, do not add commentary, output only the \
         reformatted text.",
    );
    if !spelling_hints.is_empty() {
        prompt.push_str(&format!(
            " Proper nouns that may be misheard and their correct spellings: {}.",
            spelling_hints.join(", ")
        ));
    }
    prompt
}

/// Reformats transcripts through the text model.
#[derive(Debug, Clone)]
pub struct Reformatter {
    client: OllamaClient,
    model: String,
}

impl Reformatter {
    pub fn new(client: OllamaClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    /// Reformat a whole transcript. Short texts skip the model entirely;
    /// chunk failures degrade to the raw chunk.
    pub async fn reformat(&self, text: &str, spelling_hints: &[String]) -> String {
        if text.chars().count() < MIN_REFORMAT_CHARS {
            return text.to_string();
        }

        let system = reformat_prompt(spelling_hints);
        let chunks = chunk_text(text, MAX_CHUNK_CHARS);
        debug!(chunks = chunks.len(), "reformatting transcript");

        let mut out = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let request = ChatRequest::new(&self.model)
                .message(Message::system(&system))
                .message(Message::user(chunk))
                .temperature(REFORMAT_TEMPERATURE);

            match self.client.chat(request).await {
                Ok(reformatted) if !reformatted.trim().is_empty() => {
                    out.push(reformatted.trim().to_string())
                }
                Ok(_) => {
                    warn!(chunk = index, "model returned empty chunk, keeping raw text");
                    out.push(chunk.clone());
                }
                Err(e) => {
                    warn!(chunk = index, error = %e, "reformat failed, keeping raw text");
                    out.push(chunk.clone());
                }
            }
        }
        out.join("\n\n")
    }
}

/// Spelling hints from the episode title plus show-note brand names.
pub fn spelling_hints(episode_title: &str, brands: &[String]) -> Vec<String> {
    let mut hints: Vec<String> = episode_title
        .split(|c: char| !c.is_alphanumeric() && c != '\'')
        .filter(|w| w.len() > 3 && w.chars().next().map(|c| c.is_uppercase()).unwrap_or(false))
        .map(String::from)
        .collect();
    hints.extend(brands.iter().cloned());
    hints.sort();
    hints.dedup();
    hints
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_single_chunk() {
        let chunks = chunk_text("short text", 100);
        assert_eq!(chunks, vec!["short text"]);
    }

    #[test]
    fn chunks_respect_max_chars() {
        let text = "word ".repeat(10_000);
        for chunk in chunk_text(&text, MAX_CHUNK_CHARS) {
            assert!(chunk.chars().count() <= MAX_CHUNK_CHARS);
        }
    }

    #[test]
    fn paragraph_boundary_is_preferred() {
        let text = format!("{}\n\n{}", "a".repeat(60), "b".repeat(60));
        let chunks = chunk_text(&text, 100);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].chars().all(|c| c == 'a'));
        assert!(chunks[1].chars().all(|c| c == 'b'));
    }

    #[test]
    fn sentence_boundary_is_second_choice() {
        let text = format!("{}. {}", "a".repeat(60), "b".repeat(60));
        let chunks = chunk_text(&text, 100);
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].ends_with('.'));
    }

    #[test]
    fn unbreakable_text_is_hard_cut() {
        let text = "x".repeat(250);
        let chunks = chunk_text(&text, 100);
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn nothing_is_lost_in_chunking() {
        let text = "The quick brown fox. ".repeat(2000);
        let chunks = chunk_text(&text, MAX_CHUNK_CHARS);
        let rejoined: String = chunks.join(" ");
        let normalize = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(normalize(&rejoined), normalize(&text));
    }

    #[test]
    fn hints_pull_capitalized_title_words_and_brands() {
        let hints = spelling_hints(
            "Interview with Jane Goodall about Gombe",
            &["squarespace".to_string()],
        );
        assert!(hints.contains(&"Jane".to_string()));
        assert!(hints.contains(&"Goodall".to_string()));
        assert!(hints.contains(&"Gombe".to_string()));
        assert!(hints.contains(&"squarespace".to_string()));
        assert!(!hints.contains(&"with".to_string()));
    }

    #[test]
    fn prompt_mentions_hints() {
        let prompt = reformat_prompt(&["Gombe".to_string()]);
        assert!(prompt.contains("Gombe"));
    }
}
