//! Context assembly: recent turns plus similarity-retrieved history.
//!
//! The recency cache supplies the last few turns verbatim; the vector index
//! supplies older exchanges that resemble the current request. The assembler
//! combines both into one prompt-ready block and drops retrieved documents
//! the recency window already shows, so an exchange is never injected twice.
//!
//! Assembly is deterministic: identical inputs produce identical output.

use crate::cache::MessageCache;
use crate::format::{NO_RESULTS, format_results};
use parley_core::index::QueryResult;
use std::collections::HashSet;

const RETRIEVED_HEADING: &str = "### Relevant past exchanges";
const RECENT_HEADING: &str = "### Recent conversation";

/// The two context sections for one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledContext {
    /// Prompt forms of the most recent messages, oldest first
    pub recent: Vec<String>,
    /// Formatted retrieved documents, or "No results found."
    pub retrieved: String,
}

impl AssembledContext {
    /// Whether retrieval contributed anything.
    pub fn has_retrieved(&self) -> bool {
        self.retrieved != NO_RESULTS
    }

    /// One string with a labelled section per source. The recent section is
    /// left out when the cache is empty.
    pub fn render(&self) -> String {
        let mut out = String::from(RETRIEVED_HEADING);
        out.push('\n');
        out.push_str(self.retrieved.trim_start_matches('\n'));

        if !self.recent.is_empty() {
            out.push_str("\n\n");
            out.push_str(RECENT_HEADING);
            out.push('\n');
            out.push_str(&self.recent.join("\n"));
        }
        out
    }
}

/// Stateless, reusable combiner of recency and retrieval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextAssembler {
    recent_turns: usize,
}

impl ContextAssembler {
    /// Include the last `recent_turns` turns verbatim.
    pub fn new(recent_turns: usize) -> Self {
        Self { recent_turns }
    }

    pub fn recent_turns(&self) -> usize {
        self.recent_turns
    }

    pub fn assemble(&self, cache: &MessageCache, retrieved: &QueryResult) -> AssembledContext {
        let window = cache.get_last_n(self.recent_turns);

        let mut recent = Vec::with_capacity(window.len() * 2);
        let mut shown = HashSet::with_capacity(window.len() * 2);
        for turn in &window {
            for message in turn.messages() {
                recent.push(message.to_prompt_string());
                shown.insert(message.to_memory_string());
            }
        }

        let retrieved = format_results(&without_documents(retrieved, &shown));
        AssembledContext { recent, retrieved }
    }
}

/// Copy `results` minus any document in `shown`, keeping the columns aligned.
fn without_documents(results: &QueryResult, shown: &HashSet<String>) -> QueryResult {
    let mut filtered = QueryResult::default();

    for (group, documents) in results.documents.iter().enumerate() {
        let keep: Vec<usize> = documents
            .iter()
            .enumerate()
            .filter(|(_, document)| !shown.contains(*document))
            .map(|(i, _)| i)
            .collect();

        filtered
            .documents
            .push(keep.iter().map(|&i| documents[i].clone()).collect());
        if let Some(ids) = results.ids.get(group) {
            filtered
                .ids
                .push(keep.iter().filter_map(|&i| ids.get(i).cloned()).collect());
        }
        if let Some(metadatas) = results.metadatas.get(group) {
            filtered
                .metadatas
                .push(keep.iter().filter_map(|&i| metadatas.get(i).cloned()).collect());
        }
        if let Some(distances) = results.distances.get(group) {
            filtered
                .distances
                .push(keep.iter().filter_map(|&i| distances.get(i).copied()).collect());
        }
    }
    filtered
}
