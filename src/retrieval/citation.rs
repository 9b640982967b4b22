//! Legal article citation extraction
//!
//! Grammar, matched case-insensitively at a word boundary:
//!
//! ```text
//! citation := letter ws* "."? ws* digits "-" digits suffix?
//! letter   := "L" | "R" | "D"
//! suffix   := one ASCII letter not followed by another letter
//! ```
//!
//! The canonical form drops whitespace and periods and upper-cases the
//! leading letter: `l'article L. 217-3` gives `L217-3`, `L 221-28b` gives
//! `L221-28b`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical article identifier, e.g. `L217-3`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArticleId(String);

impl ArticleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against a stored article number
    pub fn matches(&self, article_number: &str) -> bool {
        self.0.eq_ignore_ascii_case(article_number.trim())
    }
}

impl fmt::Display for ArticleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ArticleId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Find the first article citation in `query` and return its canonical form
pub fn extract_article_id(query: &str) -> Option<ArticleId> {
    let chars: Vec<char> = query.chars().collect();

    (0..chars.len())
        .filter(|&i| is_article_letter(chars[i]))
        .filter(|&i| i == 0 || !chars[i - 1].is_alphanumeric())
        .find_map(|i| parse_citation(&chars, i))
}

fn is_article_letter(c: char) -> bool {
    matches!(c.to_ascii_uppercase(), 'L' | 'R' | 'D')
}

fn parse_citation(chars: &[char], start: usize) -> Option<ArticleId> {
    let mut pos = start + 1;

    pos = skip_whitespace(chars, pos);
    if chars.get(pos) == Some(&'.') {
        pos += 1;
    }
    pos = skip_whitespace(chars, pos);

    let (first, next) = digit_run(chars, pos)?;
    pos = next;

    if chars.get(pos) != Some(&'-') {
        return None;
    }
    pos += 1;

    let (second, next) = digit_run(chars, pos)?;
    pos = next;

    let mut id = String::with_capacity(first.len() + second.len() + 3);
    id.push(chars[start].to_ascii_uppercase());
    id.push_str(&first);
    id.push('-');
    id.push_str(&second);

    if let Some(&suffix) = chars.get(pos) {
        let followed_by_letter = chars.get(pos + 1).is_some_and(|c| c.is_alphabetic());
        if suffix.is_ascii_alphabetic() && !followed_by_letter {
            id.push(suffix);
        }
    }

    Some(ArticleId(id))
}

fn skip_whitespace(chars: &[char], mut pos: usize) -> usize {
    while chars.get(pos).is_some_and(|c| c.is_whitespace()) {
        pos += 1;
    }
    pos
}

/// Consume one or more ASCII digits
fn digit_run(chars: &[char], start: usize) -> Option<(String, usize)> {
    let mut pos = start;
    while chars.get(pos).is_some_and(|c| c.is_ascii_digit()) {
        pos += 1;
    }
    if pos == start {
        None
    } else {
        Some((chars[start..pos].iter().collect(), pos))
    }
}
