//! Grapheme-bounded truncation of post text, rewriting facets to match.

use unicode_segmentation::UnicodeSegmentation;

use crate::facet::Facet;

/// The protocol's post length limit, in extended grapheme clusters.
pub const MAX_POST_GRAPHEMES: usize = 300;

/// Affordance appended to truncated text.
const ELLIPSIS: &str = " […]";

/// Count extended grapheme clusters.
pub fn grapheme_count(text: &str) -> usize {
    text.graphemes(true).count()
}

/// Enforce the grapheme limit on `text`, rewriting `facets` consistently.
///
/// Within the limit this is the identity. Over the limit, the largest
/// whole-word prefix that fits together with the ellipsis affordance is
/// kept. A limit too small to hold the affordance itself degrades to a
/// bare hard cut at `limit` graphemes. Facets entirely past the cutoff
/// are dropped; facets overlapping it are clipped to end at the cutoff.
/// Returns the new text, the surviving facets, and whether truncation
/// happened.
pub fn enforce_limit(text: &str, facets: Vec<Facet>, limit: usize) -> (String, Vec<Facet>, bool) {
    if grapheme_count(text) <= limit {
        return (text.to_string(), facets, false);
    }

    let budget = limit.saturating_sub(grapheme_count(ELLIPSIS));
    let (cutoff, ellipsis) = if budget == 0 {
        (grapheme_boundary(text, limit), "")
    } else {
        (word_cutoff(text, budget), ELLIPSIS)
    };

    let mut truncated = String::with_capacity(cutoff + ellipsis.len());
    truncated.push_str(&text[..cutoff]);
    truncated.push_str(ellipsis);

    let kept = facets
        .into_iter()
        .filter_map(|mut facet| {
            if facet.index.byte_start >= cutoff {
                return None;
            }
            facet.index.byte_end = facet.index.byte_end.min(cutoff);
            Some(facet)
        })
        .collect();

    (truncated, kept, true)
}

/// Byte offset of the `n`th grapheme boundary.
fn grapheme_boundary(text: &str, n: usize) -> usize {
    text.grapheme_indices(true)
        .nth(n)
        .map_or(text.len(), |(i, _)| i)
}

/// Byte offset ending the largest whole-word prefix of at most `budget`
/// graphemes. Falls back to a mid-word cut when no whole word fits.
fn word_cutoff(text: &str, budget: usize) -> usize {
    let hard = grapheme_boundary(text, budget);
    let prefix = &text[..hard];

    let mid_word = text[hard..]
        .chars()
        .next()
        .is_some_and(|c| !c.is_whitespace())
        && prefix.chars().next_back().is_some_and(|c| !c.is_whitespace());
    if !mid_word {
        return prefix.trim_end().len();
    }

    match prefix.rfind(char::is_whitespace) {
        Some(ws) => prefix[..ws].trim_end().len(),
        None => prefix.len(),
    }
}
