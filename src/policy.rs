//! Per-scope winner selection.
//!
//! Candidates are split into those on the form page's registrable domain and
//! everything else. Each side keeps its highest-scoring candidate (first one
//! on ties, and candidates arrive sorted by `(text, url)`). The same-site
//! winner is taken when it reaches the threshold; the cross-site winner only
//! when the same-site side is empty or falls short.

use crate::domain;
use crate::models::Candidate;

/// The selected candidate of one scope.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Winner {
    pub index: usize,
    pub score: f32,
    pub same_site: bool,
}

/// Picks the winning candidate of a scope, or `None` when no candidate
/// reaches `threshold`.
///
/// `anchor` is the registrable domain of the form's page (see
/// [`domain::registrable_domain`]).
pub fn select_winner(
    candidates: &[Candidate],
    scores: &[f32],
    anchor: Option<&str>,
    threshold: f32,
) -> Option<Winner> {
    debug_assert_eq!(candidates.len(), scores.len());

    let mut same: Option<(usize, f32)> = None;
    let mut cross: Option<(usize, f32)> = None;

    for (index, (candidate, &score)) in candidates.iter().zip(scores).enumerate() {
        let slot = if domain::same_site(anchor, &candidate.url) {
            &mut same
        } else {
            &mut cross
        };
        if slot.map_or(true, |(_, best)| score > best) {
            *slot = Some((index, score));
        }
    }

    let pick = |best: Option<(usize, f32)>, same_site: bool| {
        best.filter(|(_, score)| *score >= threshold)
            .map(|(index, score)| Winner {
                index,
                score,
                same_site,
            })
    };

    pick(same, true).or_else(|| pick(cross, false))
}
