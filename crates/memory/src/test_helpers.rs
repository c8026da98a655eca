//! Deterministic embedders for unit tests.

use async_trait::async_trait;
use parley_core::embedding::TextEmbedder;
use parley_core::error::EmbedError;

pub(crate) const DIMENSIONS: usize = 32;

/// Hashes each lowercase word into one of [`DIMENSIONS`] buckets.
///
/// Texts sharing words land close together under cosine distance.
pub(crate) struct BagOfWordsEmbedder;

pub(crate) fn bag_of_words(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; DIMENSIONS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_lowercase();
        // FNV-1a
        let mut hash: u32 = 0x811c_9dc5;
        for byte in word.bytes() {
            hash ^= byte as u32;
            hash = hash.wrapping_mul(0x0100_0193);
        }
        v[hash as usize % DIMENSIONS] += 1.0;
    }
    v
}

#[async_trait]
impl TextEmbedder for BagOfWordsEmbedder {
    fn name(&self) -> &str {
        "bag-of-words"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

/// Always fails, like an embedding server that is down.
pub(crate) struct UnreachableEmbedder;

#[async_trait]
impl TextEmbedder for UnreachableEmbedder {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Err(EmbedError::Network("connection refused".into()))
    }
}

/// Returns one vector too few.
pub(crate) struct ShortEmbedder;

#[async_trait]
impl TextEmbedder for ShortEmbedder {
    fn name(&self) -> &str {
        "short"
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(texts.iter().skip(1).map(|t| bag_of_words(t)).collect())
    }
}
