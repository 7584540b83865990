//! Semantic chunking: split where the meaning of the text shifts.
//!
//! The text is broken into sentences, each sentence is embedded together with
//! its neighbours, and a chunk boundary is placed wherever the cosine distance
//! between consecutive sentence windows exceeds the configured percentile of
//! all such distances.

use crate::errors::AgentError;
use crate::rag::embeddings::{cosine_similarity, EmbeddingGenerator};
use regex::Regex;

pub struct SemanticChunker {
    breakpoint_percentile: f32,
    buffer_size: usize,
    sentence_pattern: Regex,
}

impl SemanticChunker {
    pub fn new(breakpoint_percentile: f32, buffer_size: usize) -> Result<Self, AgentError> {
        let sentence_pattern = Regex::new(r"[^.!?]+(?:[.!?]+|$)")
            .map_err(|e| AgentError::RagError(format!("Invalid sentence pattern: {}", e)))?;
        Ok(Self {
            breakpoint_percentile: breakpoint_percentile.clamp(0.0, 100.0),
            buffer_size,
            sentence_pattern,
        })
    }

    pub fn split_sentences(&self, text: &str) -> Vec<String> {
        self.sentence_pattern
            .find_iter(text)
            .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub async fn split_text(
        &self,
        text: &str,
        embedder: &dyn EmbeddingGenerator,
    ) -> Result<Vec<String>, AgentError> {
        let sentences = self.split_sentences(text);
        if sentences.len() <= 1 {
            return Ok(sentences);
        }

        let windows = self.combine_with_neighbours(&sentences);
        let embeddings = embedder.generate_embeddings(&windows).await?;
        if embeddings.len() != sentences.len() {
            return Err(AgentError::RagError(format!(
                "Expected {} sentence embeddings, got {}",
                sentences.len(),
                embeddings.len()
            )));
        }

        let distances: Vec<f32> = embeddings
            .windows(2)
            .map(|pair| 1.0 - cosine_similarity(&pair[0], &pair[1]))
            .collect();
        let threshold = percentile(&distances, self.breakpoint_percentile);

        let mut chunks = Vec::new();
        let mut start = 0;
        for (i, distance) in distances.iter().enumerate() {
            if *distance > threshold {
                chunks.push(sentences[start..=i].join(" "));
                start = i + 1;
            }
        }
        if start < sentences.len() {
            chunks.push(sentences[start..].join(" "));
        }

        log::debug!(
            "Semantic chunking produced {} chunks from {} sentences (threshold {:.4})",
            chunks.len(),
            sentences.len(),
            threshold
        );
        Ok(chunks)
    }

    fn combine_with_neighbours(&self, sentences: &[String]) -> Vec<String> {
        (0..sentences.len())
            .map(|i| {
                let lo = i.saturating_sub(self.buffer_size);
                let hi = (i + self.buffer_size).min(sentences.len() - 1);
                sentences[lo..=hi].join(" ")
            })
            .collect()
    }
}

/// Percentile with linear interpolation between closest ranks.
pub fn percentile(values: &[f32], pct: f32) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = (pct.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f32;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f32)
}
