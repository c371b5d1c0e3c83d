//! Compiled-in key definitions.
//!
//! These mirror the deployed registry so the engine can run without an
//! external `keys.json`. Ids are stable across runs and releases.

use crate::KeyType;

/// Key id constants.
pub mod id {
    /// Unique candidate identifier (i64).
    pub const CAND_CANDIDATE_ID: i32 = 1001;
    /// Freshness score in `[0, 1]` (f32).
    pub const FEAT_FRESHNESS: i32 = 2001;
    /// Candidate embedding vector (f32vec).
    pub const FEAT_EMBEDDING: i32 = 2002;
    /// Query embedding vector (f32vec).
    pub const FEAT_QUERY_EMBEDDING: i32 = 2003;
    /// Base retrieval score from the sourcer (f32).
    pub const SCORE_BASE: i32 = 3001;
    /// ML model prediction score (f32).
    pub const SCORE_ML: i32 = 3002;
    /// Score after adjustments from guest modules (f32).
    pub const SCORE_ADJUSTED: i32 = 3003;
    /// Final ranking score used for ordering (f32).
    pub const SCORE_FINAL: i32 = 3999;
    /// Penalty for constraint violations (f32).
    pub const PENALTY_CONSTRAINTS: i32 = 4001;
    /// Penalty for diversity enforcement (f32).
    pub const PENALTY_DIVERSITY: i32 = 4002;
    /// JSON string of per-node timing information (string).
    pub const DEBUG_NODE_TIMINGS: i32 = 9001;
}

/// All compiled-in key definitions as `(id, name, type)`.
pub const ALL_KEYS: &[(i32, &str, KeyType)] = &[
    (id::CAND_CANDIDATE_ID, "cand.candidate_id", KeyType::I64),
    (id::FEAT_FRESHNESS, "feat.freshness", KeyType::F32),
    (id::FEAT_EMBEDDING, "feat.embedding", KeyType::F32Vec),
    (id::FEAT_QUERY_EMBEDDING, "feat.query_embedding", KeyType::F32Vec),
    (id::SCORE_BASE, "score.base", KeyType::F32),
    (id::SCORE_ML, "score.ml", KeyType::F32),
    (id::SCORE_ADJUSTED, "score.adjusted", KeyType::F32),
    (id::SCORE_FINAL, "score.final", KeyType::F32),
    (id::PENALTY_CONSTRAINTS, "penalty.constraints", KeyType::F32),
    (id::PENALTY_DIVERSITY, "penalty.diversity", KeyType::F32),
    (id::DEBUG_NODE_TIMINGS, "debug.node_timings", KeyType::String),
];
