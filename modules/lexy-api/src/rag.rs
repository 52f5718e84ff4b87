//! Retrieval over a single scraped page.

use ai_client::{cosine_similarity, EmbedAgent};
use anyhow::{ensure, Result};
use tracing::debug;

pub const CHUNK_SIZE: usize = 1000;
pub const CHUNK_OVERLAP: usize = 200;
pub const TOP_K: usize = 4;

/// Split into windows of `size` chars, each starting `size - overlap` chars after the last.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() || size == 0 {
        return Vec::new();
    }
    let step = size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + size).min(chars.len());
        let chunk: String = chars[start..end].iter().collect();
        if !chunk.trim().is_empty() {
            chunks.push(chunk);
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    chunks
}

/// Indices of the `k` highest-scoring vectors, best first.
pub fn top_k(query: &[f32], candidates: &[Vec<f32>], k: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(i, v)| (i, cosine_similarity(query, v)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.into_iter().take(k).map(|(i, _)| i).collect()
}

/// The chunks of `content` most similar to `query`, in the order they appear in the page.
pub async fn relevant_chunks<E: EmbedAgent>(embedder: &E, content: &str, query: &str) -> Result<Vec<String>> {
    let chunks = chunk_text(content, CHUNK_SIZE, CHUNK_OVERLAP);
    if chunks.len() <= TOP_K {
        return Ok(chunks);
    }

    let mut inputs = chunks.clone();
    inputs.push(query.to_string());
    let mut vectors = embedder.embed_batch(inputs).await?;
    ensure!(
        vectors.len() == chunks.len() + 1,
        "Expected {} embeddings, got {}",
        chunks.len() + 1,
        vectors.len()
    );

    let query_vec = vectors.pop().unwrap_or_default();
    let mut picked = top_k(&query_vec, &vectors, TOP_K);
    debug!(chunks = chunks.len(), picked = ?picked, "Selected context chunks");
    picked.sort_unstable();
    Ok(picked.into_iter().map(|i| chunks[i].clone()).collect())
}

pub const RAG_SYSTEM_PROMPT: &str = "You answer questions about a single web page. \
Use only the page excerpts and conversation provided. If the excerpts do not contain the answer, say so plainly. \
When you rely on the page, cite it as <a href=\"SOURCE_URL\">[1]</a>. \
Format the answer as HTML using <p>, <ul>, <li>, <strong> and <em> tags only.";

pub fn rag_user_prompt(url: &str, excerpts: &[String], context: Option<&str>, query: &str) -> String {
    let mut prompt = format!("Page: {url}\n\nExcerpts:\n");
    for (i, excerpt) in excerpts.iter().enumerate() {
        prompt.push_str(&format!("--- excerpt {} ---\n{}\n", i + 1, excerpt.trim()));
    }
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("\nConversation so far:\n{context}\n"));
    }
    prompt.push_str(&format!("\nQuestion: {query}"));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Embeds text as [count of 'a', count of 'b'].
    struct LetterEmbedder;

    #[async_trait]
    impl EmbedAgent for LetterEmbedder {
        async fn embed(&self, text: impl Into<String> + Send) -> Result<Vec<f32>> {
            let text = text.into();
            Ok(vec![
                text.matches('a').count() as f32,
                text.matches('b').count() as f32,
            ])
        }

        async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::new();
            for t in texts {
                out.push(self.embed(t).await?);
            }
            Ok(out)
        }
    }

    #[test]
    fn chunks_overlap_by_configured_amount() {
        let text: String = (0..2500).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
        let chunks = chunk_text(&text, 1000, 200);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].chars().count(), 1000);
        assert_eq!(&chunks[0][800..], &chunks[1][..200]);
        assert_eq!(chunks[2].chars().count(), 900);
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("hello", 1000, 200), vec!["hello"]);
        assert!(chunk_text("", 1000, 200).is_empty());
    }

    #[test]
    fn top_k_orders_by_similarity() {
        let candidates = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]];
        assert_eq!(top_k(&[1.0, 0.0], &candidates, 2), vec![1, 2]);
    }

    #[tokio::test]
    async fn picks_chunks_closest_to_the_query_in_page_order() {
        let content = [
            "a".repeat(800),
            "b".repeat(800),
            "a".repeat(800),
            "b".repeat(800),
            "a".repeat(800),
            "b".repeat(800),
        ]
        .concat();
        let picked = relevant_chunks(&LetterEmbedder, &content, "aaaa").await.unwrap();
        assert_eq!(picked.len(), TOP_K);
        let a_heavy = picked
            .iter()
            .filter(|c| c.matches('a').count() > c.matches('b').count())
            .count();
        assert_eq!(a_heavy, 3);
        assert!(picked[0].starts_with('a'));
    }

    #[test]
    fn prompt_includes_prior_conversation() {
        let prompt = rag_user_prompt(
            "https://x.example",
            &["excerpt".to_string()],
            Some("User: hi\nAssistant: hello"),
            "what next?",
        );
        assert!(prompt.contains("Conversation so far:\nUser: hi"));
        assert!(prompt.ends_with("Question: what next?"));
    }
}
