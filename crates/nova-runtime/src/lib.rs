// SPDX-License-Identifier: Apache-2.0
pub mod context;
pub mod embeddings;
pub mod hybrid_search;
pub mod indexer;
pub mod summarizer;

pub use context::{compute_fingerprint, load_continuous_context, ContinuousContextSnapshot};
pub use embeddings::{DisabledEmbeddingService, EmbeddingService, HttpEmbeddingService};
pub use hybrid_search::{blend_candidates, rank_and_page, ScoredCandidate};
