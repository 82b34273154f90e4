//! Candidate scoring from the domain worker's side.
//!
//! A candidate contributes two texts to semantic scoring: its visible link
//! text and the last segment of its URL path (query and fragment removed,
//! percent-decoded, extension stripped). Its score is the higher of the two
//! semantic scores, raised to at least the threshold when the link text,
//! the path segment, or the raw URL contains a seed phrase.
//!
//! Semantic scores come from the scoring pool through [`ScoreClient`]. When
//! they are unavailable the lexical floor alone decides.

use crossbeam_channel::Sender;
use tracing::{debug, warn};
use url::Url;

use crate::models::Candidate;
use crate::phrases;
use crate::scoring_worker::{ScoreError, ScoreMessage, ScoreReply, ScoreRequest};

/// Handle a domain worker uses to score candidates through the shared queue.
#[derive(Clone)]
pub struct ScoreClient {
    queue: Sender<ScoreMessage>,
    threshold: f32,
}

impl ScoreClient {
    pub fn new(queue: Sender<ScoreMessage>, threshold: f32) -> Self {
        Self { queue, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Scores `candidates`, one score in `[0, 1]` per candidate, in order.
    ///
    /// Blocks while the queue is full and until the scoring worker replies.
    pub fn score(&self, candidates: &[Candidate]) -> Vec<f32> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let features: Vec<[String; 2]> = candidates.iter().map(link_features).collect();
        let texts: Vec<String> = features.iter().flat_map(|f| f.iter().cloned()).collect();

        let semantic = match self.request(texts) {
            Ok(scores) if scores.len() == 2 * candidates.len() => Some(scores),
            Ok(scores) => {
                warn!(
                    expected = 2 * candidates.len(),
                    got = scores.len(),
                    "Scoring reply has wrong length; using seed-phrase matching only"
                );
                None
            }
            Err(ScoreError::Unavailable) => None,
            Err(e) => {
                warn!(error = %e, "Semantic scoring failed; using seed-phrase matching only");
                None
            }
        };

        candidates
            .iter()
            .zip(&features)
            .enumerate()
            .map(|(i, (candidate, feature))| {
                let mut score = semantic
                    .as_ref()
                    .map(|s| s[2 * i].max(s[2 * i + 1]))
                    .unwrap_or(0.0);
                if lexical_match(candidate, &feature[1]) {
                    score = score.max(self.threshold);
                }
                score.clamp(0.0, 1.0)
            })
            .collect()
    }

    fn request(&self, texts: Vec<String>) -> ScoreReply {
        let (reply, response) = crossbeam_channel::bounded(1);
        self.queue
            .send(ScoreMessage::Score(ScoreRequest { texts, reply }))
            .map_err(|_| ScoreError::WorkerGone)?;
        let scores = response.recv().map_err(|_| ScoreError::WorkerGone)?;
        debug!(ok = scores.is_ok(), "Scoring reply received");
        scores
    }
}

/// `[link text, last path segment]` of a candidate.
pub fn link_features(candidate: &Candidate) -> [String; 2] {
    [candidate.text.clone(), last_path_segment(&candidate.url)]
}

fn lexical_match(candidate: &Candidate, path_segment: &str) -> bool {
    phrases::matches(&candidate.text)
        || phrases::matches(path_segment)
        || phrases::matches(&candidate.url)
}

/// Last non-empty segment of the URL path, percent-decoded, without its
/// file extension. Empty for root paths and unparseable URLs.
pub fn last_path_segment(url: &str) -> String {
    let Ok(parsed) = Url::parse(url) else {
        return String::new();
    };
    let path = parsed.path().trim_end_matches('/');
    let segment = path.rsplit('/').next().unwrap_or("");
    let decoded = urlencoding::decode_binary(segment.as_bytes());
    let decoded = String::from_utf8_lossy(&decoded);
    strip_extension(&decoded).to_string()
}

/// Removes a trailing `.ext`; leading dots never start an extension.
fn strip_extension(name: &str) -> &str {
    let leading = name.len() - name.trim_start_matches('.').len();
    match name[leading..].rfind('.') {
        Some(pos) => &name[..leading + pos],
        None => name,
    }
}
