//! Assembly space generation
//!
//! Turns a question into words, a distance matrix, importance weights and
//! laid-out positions by consulting a [`CompletionProvider`]. Only the word
//! list is essential: every later call falls back to deterministic defaults
//! when the provider fails or answers with garbage.

use std::time::{Duration, Instant};

use glam::Vec3;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AssemblyError, AssemblyResult};
use crate::layout::{LayoutParams, layout};
use crate::matrix::DistanceMatrix;
use crate::progress::{ProgressEvent, ProgressSink, Stage};
use crate::provider::CompletionProvider;
use crate::topology::TopologySummary;

/// Line prefix carrying the question in the word-list prompt
pub const QUESTION_MARKER: &str = "Question: ";

/// Longest accepted word or phrase
const MAX_WORD_LEN: usize = 40;

/// Parameters for space generation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpaceParams {
    /// Upper bound on the number of core words
    pub max_words: usize,
    /// Neighbours rated per word
    pub neighbour_sample: usize,
    /// Similarity used for unrated or out-of-range pairs
    pub default_similarity: f32,
    /// Importance used for unrated or out-of-range words
    pub default_importance: f32,
    /// Seconds the rating stages may spend on the provider before the
    /// remaining ratings take their defaults
    pub rating_budget: f32,
}

/// Longest rating budget honoured, in seconds
const RATING_BUDGET_CAP: u64 = 86_400;

impl Default for SpaceParams {
    fn default() -> Self {
        Self {
            max_words: 30,
            neighbour_sample: 5,
            default_similarity: 0.5,
            default_importance: 2.0,
            rating_budget: 90.0,
        }
    }
}

/// Everything one question produces, index-aligned by word
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssemblySpace {
    pub question: String,
    pub words: Vec<String>,
    pub distance_matrix: DistanceMatrix,
    pub weights: Vec<f32>,
    pub positions: Vec<Vec3>,
}

impl AssemblySpace {
    /// Assemble a space, checking that every per-word sequence has the same length
    pub fn new(
        question: impl Into<String>,
        words: Vec<String>,
        distance_matrix: DistanceMatrix,
        weights: Vec<f32>,
        positions: Vec<Vec3>,
    ) -> AssemblyResult<Self> {
        let n = words.len();
        if distance_matrix.len() != n || weights.len() != n || positions.len() != n {
            return Err(AssemblyError::InvalidSpace(format!(
                "{} words, {}x{} matrix, {} weights, {} positions",
                n,
                distance_matrix.len(),
                distance_matrix.len(),
                weights.len(),
                positions.len()
            )));
        }
        Ok(Self {
            question: question.into(),
            words,
            distance_matrix,
            weights,
            positions,
        })
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Builds an [`AssemblySpace`] from a question
#[derive(Debug, Clone, Default)]
pub struct SpaceBuilder {
    pub params: SpaceParams,
    pub layout: LayoutParams,
}

impl SpaceBuilder {
    pub fn new(params: SpaceParams, layout: LayoutParams) -> Self {
        Self { params, layout }
    }

    /// Run the full generation pipeline
    ///
    /// Fails only when the word list cannot be obtained.
    pub fn build<R: Rng + ?Sized>(
        &self,
        question: &str,
        provider: &dyn CompletionProvider,
        sink: &mut dyn ProgressSink,
        rng: &mut R,
    ) -> AssemblyResult<AssemblySpace> {
        sink.emit(ProgressEvent::new(Stage::Words, 0.0, "Generating concepts"));
        let response = provider.complete(&word_prompt(question, self.params.max_words))?;
        let words = parse_words(&response, self.params.max_words);
        if words.is_empty() {
            return Err(AssemblyError::MalformedResponse(
                "word list response contained no words".to_string(),
            ));
        }
        info!(provider = provider.name(), words = words.len(), "word list ready");
        sink.emit(ProgressEvent::new(
            Stage::Words,
            100.0,
            format!("Found {} concepts", words.len()),
        ));

        let budget = Duration::try_from_secs_f32(self.params.rating_budget.max(0.0))
            .unwrap_or(Duration::from_secs(RATING_BUDGET_CAP));
        let deadline = Instant::now() + budget;
        let distance_matrix = self.rate_similarities(&words, provider, sink, deadline)?;
        let weights = self.rate_importance(question, &words, provider, sink, deadline);

        sink.emit(ProgressEvent::new(Stage::Layout, 0.0, "Projecting into 3D"));
        let positions = layout(&distance_matrix, &self.layout, rng);
        sink.emit(ProgressEvent::new(Stage::Layout, 100.0, "Layout complete"));

        AssemblySpace::new(question, words, distance_matrix, weights, positions)
    }

    fn rate_similarities(
        &self,
        words: &[String],
        provider: &dyn CompletionProvider,
        sink: &mut dyn ProgressSink,
        deadline: Instant,
    ) -> AssemblyResult<DistanceMatrix> {
        let n = words.len();
        let mut ratings: Vec<Vec<Option<f32>>> = vec![vec![None; n]; n];
        let mut failures = 0usize;
        let mut skipped = 0usize;

        for i in 0..n {
            let neighbours = sample_neighbours(i, n, self.params.neighbour_sample);
            if neighbours.is_empty() {
                continue;
            }
            if Instant::now() >= deadline {
                if skipped == 0 {
                    warn!(
                        rated = i,
                        words = n,
                        "rating budget spent, using default similarity for the rest"
                    );
                }
                skipped += 1;
                sink.emit(ProgressEvent::new(
                    Stage::Similarity,
                    (i + 1) as f32 / n as f32 * 100.0,
                    format!("Skipped {}", words[i]),
                ));
                continue;
            }

            let prompt = similarity_prompt(&words[i], neighbours.iter().map(|&j| &words[j]));
            match provider.complete(&prompt) {
                Ok(response) => {
                    let values = parse_scores(&response, neighbours.len(), 0.0, 1.0);
                    for (&j, value) in neighbours.iter().zip(values) {
                        ratings[i][j] = value;
                    }
                }
                Err(e) => {
                    if failures == 0 {
                        warn!(error = %e, "similarity rating failed, using default similarity");
                    }
                    failures += 1;
                }
            }

            sink.emit(ProgressEvent::new(
                Stage::Similarity,
                (i + 1) as f32 / n as f32 * 100.0,
                format!("Rated {}", words[i]),
            ));
        }

        debug!(words = n, failures, skipped, "similarity ratings collected");
        let similarities = resolve_similarities(&ratings, self.params.default_similarity);
        Ok(DistanceMatrix::from_similarities(&similarities)?)
    }

    fn rate_importance(
        &self,
        question: &str,
        words: &[String],
        provider: &dyn CompletionProvider,
        sink: &mut dyn ProgressSink,
        deadline: Instant,
    ) -> Vec<f32> {
        sink.emit(ProgressEvent::new(Stage::Importance, 0.0, "Weighing concepts"));
        let default = self.params.default_importance;

        if Instant::now() >= deadline {
            warn!("rating budget spent, using default importance");
            sink.emit(ProgressEvent::new(Stage::Importance, 100.0, "Concepts weighed"));
            return vec![default; words.len()];
        }

        let weights = match provider.complete(&importance_prompt(question, words)) {
            Ok(response) => parse_scores(&response, words.len(), 0.0, 10.0)
                .into_iter()
                .map(|v| v.unwrap_or(default))
                .collect(),
            Err(e) => {
                warn!(error = %e, "importance rating failed, using default importance");
                vec![default; words.len()]
            }
        };

        sink.emit(ProgressEvent::new(Stage::Importance, 100.0, "Concepts weighed"));
        weights
    }
}

/// Prompt asking for the concept list
pub fn word_prompt(question: &str, max_words: usize) -> String {
    format!(
        "List up to {max_words} single words or short phrases capturing the concepts, \
         associations and tensions behind the question below. \
         Answer with a comma-separated list only.\n{QUESTION_MARKER}{question}"
    )
}

/// Prompt asking how similar `word` is to each neighbour
pub fn similarity_prompt<'a>(word: &str, neighbours: impl Iterator<Item = &'a String>) -> String {
    let mut prompt = format!(
        "Rate the semantic similarity between \"{word}\" and each word below \
         on a scale from 0 to 1. Answer with one number per line, in order, and nothing else.\n"
    );
    for (k, other) in neighbours.enumerate() {
        prompt.push_str(&format!("{}. {}\n", k + 1, other));
    }
    prompt
}

/// Prompt asking for a 0-10 importance per word
pub fn importance_prompt(question: &str, words: &[String]) -> String {
    let mut prompt = format!(
        "Rate how central each word is to the question \"{question}\" on a scale \
         from 0 to 10. Answer with one number per line, in order, and nothing else.\n"
    );
    for (k, word) in words.iter().enumerate() {
        prompt.push_str(&format!("{}. {}\n", k + 1, word));
    }
    prompt
}

/// Prompt asking for commentary on the final structure
pub fn explanation_prompt(space: &AssemblySpace, summary: &TopologySummary) -> String {
    format!(
        "A question was turned into a field of {} concepts: {}.\n\
         The assembled structure has {} nodes, {} connections, density {:.3}, \
         average degree {:.2} and radius {:.1}.\n\
         In two or three sentences, interpret what this structure suggests about \"{}\".",
        space.len(),
        space.words.join(", "),
        summary.node_count,
        summary.edge_count,
        summary.density,
        summary.avg_degree,
        summary.bounding_radius,
        space.question
    )
}

/// Deterministic commentary used when the provider cannot explain the structure
pub fn fallback_explanation(summary: &TopologySummary) -> String {
    format!(
        "The field settled into {} nodes joined by {} connections \
         (density {:.3}, average degree {:.2}), spanning a radius of {:.1} units.",
        summary.node_count,
        summary.edge_count,
        summary.density,
        summary.avg_degree,
        summary.bounding_radius
    )
}

/// Split a word-list response into at most `max` distinct, normalized words
pub fn parse_words(response: &str, max: usize) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    for raw in response.split([',', '\n', ';']) {
        let word = raw
            .trim()
            .trim_start_matches(|c: char| c.is_ascii_digit() || matches!(c, '.' | ')' | '-' | '*'))
            .trim_matches(|c: char| c.is_whitespace() || matches!(c, '"' | '\'' | '`' | '.'))
            .to_lowercase();

        if word.is_empty() || word.len() > MAX_WORD_LEN || words.contains(&word) {
            continue;
        }
        words.push(word);
        if words.len() == max {
            break;
        }
    }
    words
}

/// Read `expected` scores, one per non-empty line
///
/// Lines without a number, or with a value outside `[min, max]`, yield `None`.
/// Missing lines are padded with `None`.
pub fn parse_scores(response: &str, expected: usize, min: f32, max: f32) -> Vec<Option<f32>> {
    let mut scores: Vec<Option<f32>> = response
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .take(expected)
        .map(|line| last_number(line).filter(|v| (min..=max).contains(v)))
        .collect();
    scores.resize(expected, None);
    scores
}

/// The last token in `line` that parses as a finite number
fn last_number(line: &str) -> Option<f32> {
    line.split(|c: char| c.is_whitespace() || matches!(c, ':' | ',' | '=' | '(' | ')'))
        .filter_map(|token| {
            token
                .trim_end_matches(['.', '%'])
                .parse::<f32>()
                .ok()
                .filter(|v| v.is_finite())
        })
        .last()
}

/// Deterministic stride sample of up to `k` indices other than `i`
fn sample_neighbours(i: usize, n: usize, k: usize) -> Vec<usize> {
    let others: Vec<usize> = (0..n).filter(|&j| j != i).collect();
    if others.len() <= k {
        return others;
    }
    let stride = others.len() / k;
    (0..k)
        .map(|s| others[(i + s * stride) % others.len()])
        .collect()
}

/// Merge directional ratings into a full similarity table
fn resolve_similarities(ratings: &[Vec<Option<f32>>], default: f32) -> Vec<Vec<f32>> {
    let n = ratings.len();
    let mut table = vec![vec![1.0; n]; n];
    for i in 0..n {
        for j in (i + 1)..n {
            let value = match (ratings[i][j], ratings[j][i]) {
                (Some(a), Some(b)) => (a + b) * 0.5,
                (Some(a), None) | (None, Some(a)) => a,
                (None, None) => default,
            };
            table[i][j] = value;
            table[j][i] = value;
        }
    }
    table
}
