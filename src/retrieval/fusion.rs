//! Merge vector and keyword candidates into one deduplicated set

use super::Source;
use std::collections::HashMap;

/// Fuse two candidate lists keyed by `article_number`
///
/// When an article appears in both lists the keyword entry replaces the
/// vector entry, so a boosted lexical score reaches the reranker intact.
/// Output keeps first-seen order; reranking re-sorts it.
pub fn fuse(vector_docs: Vec<Source>, keyword_docs: Vec<Source>) -> Vec<Source> {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut fused: Vec<Source> = Vec::with_capacity(vector_docs.len() + keyword_docs.len());

    for source in vector_docs.into_iter().chain(keyword_docs) {
        match slots.get(&source.article_number) {
            Some(&slot) => fused[slot] = source,
            None => {
                slots.insert(source.article_number.clone(), fused.len());
                fused.push(source);
            }
        }
    }

    fused
}
