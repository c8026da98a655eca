//! Rendering query results as prompt text.

use parley_core::index::QueryResult;

/// What [`format_results`] returns when nothing matched.
pub const NO_RESULTS: &str = "No results found.";

/// A memory-form document split back into its parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryLine<'a> {
    pub speaker: &'a str,
    pub timestamp: &'a str,
    pub message: String,
}

/// Split a `speaker @ timestamp: content` document on `" @ "`.
///
/// The first field is the speaker, the second the timestamp, and everything
/// after is rejoined with `" @ "` as the message. Minute timestamps contain
/// `" @ "` themselves, so for a real memory form the "timestamp" is the date
/// and the message starts with the time. Missing fields come back empty.
pub fn parse_memory_line(document: &str) -> MemoryLine<'_> {
    let mut parts = document.split(" @ ");
    let speaker = parts.next().unwrap_or_default().trim();
    let timestamp = parts.next().unwrap_or_default().trim();
    let message = parts.collect::<Vec<_>>().join(" @ ").trim().to_string();

    MemoryLine {
        speaker,
        timestamp,
        message,
    }
}

/// Render every retrieved document as a block, in query order, nearest first.
///
/// Each block is `"\n{speaker} ({timestamp}):\n{message}"`. Empty results
/// render as [`NO_RESULTS`].
pub fn format_results(results: &QueryResult) -> String {
    if results.is_empty() {
        return NO_RESULTS.to_string();
    }

    results
        .documents()
        .map(|document| {
            let line = parse_memory_line(document);
            format!("\n{} ({}):\n{}", line.speaker, line.timestamp, line.message)
        })
        .collect()
}
