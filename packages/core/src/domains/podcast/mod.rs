//! Podcast transcription pipeline: platform URL → iTunes metadata → audio
//! → ASR → reformatted transcript PDF in the weekly bin.

pub mod itunes;
pub mod pdf;
pub mod reformat;
pub mod shownotes;
pub mod transcript;
pub mod url;
mod worker;

pub use itunes::{EpisodeInfo, ItunesClient, PodcastInfo, PodcastLookup};
pub use pdf::{format_duration, sanitize_pdf_text, synthesize, TranscriptPdf};
pub use reformat::{chunk_text, Reformatter};
pub use shownotes::{fetch_show_notes, parse_notes_html, NoteLink, ShowNotes};
pub use transcript::{clean_srt, into_paragraphs, is_srt};
pub use url::{parse_podcast_url, PodcastUrl};
pub use worker::{PodcastHandler, PodcastJobPayload, PodcastResult};
