//! JSON parse stress over seeded random documents.

use super::WORKLOAD_SEED;
use benchloop_core::{LatencyRecorder, Workload};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Rough serialized size of one document, used to size the corpus.
const APPROX_DOC_BYTES: u64 = 1024;
/// Corpus bounds.
const MIN_DOCS: usize = 16;
const MAX_DOCS: usize = 4096;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Document {
    id: u64,
    name: String,
    score: f64,
    active: bool,
    tags: Vec<String>,
    entries: Vec<Entry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Entry {
    key: String,
    value: i64,
    weight: Option<f32>,
}

/// Parses one pre-serialized document per operation.
#[derive(Debug, Clone)]
pub struct JsonWorkload {
    corpus: Vec<String>,
    next: usize,
}

impl JsonWorkload {
    /// Workload whose corpus takes roughly 1/64 of `memory_budget`.
    pub fn new(memory_budget: u64) -> Self {
        let docs = usize::try_from(memory_budget / 64 / APPROX_DOC_BYTES)
            .unwrap_or(MAX_DOCS)
            .clamp(MIN_DOCS, MAX_DOCS);
        Self::with_documents(docs)
    }

    /// Workload with exactly `count` documents.
    pub fn with_documents(count: usize) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(WORKLOAD_SEED);
        let corpus = (0..count.max(1))
            .map(|id| {
                let doc = random_document(&mut rng, id as u64);
                // Plain data always serializes.
                serde_json::to_string(&doc).unwrap_or_default()
            })
            .collect();
        Self { corpus, next: 0 }
    }

    /// Number of documents in the corpus.
    pub fn len(&self) -> usize {
        self.corpus.len()
    }

    /// Whether the corpus is empty.
    pub fn is_empty(&self) -> bool {
        self.corpus.is_empty()
    }

    fn parse_next(&mut self) -> Option<Document> {
        let text = &self.corpus[self.next];
        self.next = (self.next + 1) % self.corpus.len();
        match serde_json::from_str(text) {
            Ok(doc) => Some(doc),
            Err(e) => {
                tracing::warn!("Corpus document failed to parse: {}", e);
                None
            }
        }
    }
}

fn random_word(rng: &mut ChaCha8Rng) -> String {
    let len = rng.random_range(3..12);
    (0..len).map(|_| rng.random_range(b'a'..=b'z') as char).collect()
}

fn random_document(rng: &mut ChaCha8Rng, id: u64) -> Document {
    let tags = (0..rng.random_range(0..6)).map(|_| random_word(rng)).collect();
    let entries = (0..rng.random_range(1..12))
        .map(|_| Entry {
            key: random_word(rng),
            value: rng.random_range(-1_000_000..1_000_000),
            weight: rng.random_bool(0.5).then(|| rng.random::<f32>()),
        })
        .collect();
    Document {
        id,
        name: random_word(rng),
        score: rng.random_range(0.0..100.0),
        active: rng.random_bool(0.8),
        tags,
        entries,
    }
}

impl Workload for JsonWorkload {
    fn run(&mut self, iterations: u64, recorder: &LatencyRecorder<'_>) {
        for _ in 0..iterations {
            let start = quanta::Instant::now();
            std::hint::black_box(self.parse_next());
            recorder.observe(start);
        }
    }
}
