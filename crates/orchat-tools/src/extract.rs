//! Best-effort parser for raw search tool output
//!
//! Input is the text produced by [`crate::format_results`] or anything close
//! to it: paragraphs separated by blank lines, each with an `[n] title` line
//! and a `URL: ...` line. Paragraphs that lack either are skipped.

use orchat_common::SearchResult;
use regex::Regex;
use std::sync::LazyLock;

static URL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"URL: (https?://\S+)").expect("valid URL pattern"));

static TITLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\d+\] (.+)").expect("valid title pattern"));

/// Structured results for the reasoning display, in output order
pub fn extract_search_results(raw: &str) -> Vec<SearchResult> {
    raw.split("\n\n").filter_map(parse_paragraph).collect()
}

fn parse_paragraph(paragraph: &str) -> Option<SearchResult> {
    let url = URL_PATTERN.captures(paragraph)?.get(1)?.as_str();
    let title = TITLE_PATTERN.captures(paragraph)?.get(1)?.as_str();
    let snippet = paragraph.lines().skip(2).collect::<Vec<_>>().join("\n");

    Some(SearchResult {
        title: title.trim_end().to_string(),
        url: url.to_string(),
        snippet,
    })
}
