//! Chatlog evidence retrieval — budgeted hybrid search over a message log,
//! exposed via MCP.
//!
//! Testimony answers questions like "should Priya lend Marco the money?" by
//! locating, ranking, context-expanding, and budget-capping the supporting
//! and contradicting evidence in a timestamped chatlog. It is a small local
//! search engine over one immutable log snapshot:
//!
//! - **Inverted metadata index** over topic/sentiment/fact-key/density labels
//! - **Brute-force cosine index** over per-message embeddings (local ONNX
//!   Runtime with all-MiniLM-L6-v2, 384 dimensions)
//! - **Score fusion** of keyword presence and semantic similarity, with
//!   per-dimension counter-evidence search
//! - **Hard resource ceilings** per session: tool calls, loaded messages,
//!   and result characters
//!
//! # Modules
//!
//! - [`config`] — Configuration loading from TOML files and environment variables
//! - [`log`] — Chatlog parsing into an addressable in-memory snapshot
//! - [`index`] — Metadata and semantic indices with on-disk artifacts
//! - [`retrieval`] — The engine: recall, fusion, budgets, evidence staging
//! - [`understand`] — Query expansion into dimension plans (rule-based or LLM)
//! - [`embedding`] — Text-to-vector embedding pipeline via ONNX Runtime

pub mod config;
pub mod embedding;
pub mod index;
pub mod log;
pub mod retrieval;
pub mod understand;
