//! Agent runtime - session handling around the external book recommendation model
//!
//! This crate connects the normalization pipeline in `bookbuddy-core` to a live model:
//! - Sends each query with the agent instruction and the session's prior turns
//! - Normalizes every reply before it reaches a user
//! - Keeps per-session turns and a global history of answered queries
//!
//! # Architecture
//!
//! 1. **Instruction** (`instruction`) - default agent instruction and summary requests
//! 2. **Client** (`llm`, `http`) - `AgentClient` trait and its HTTP implementation
//! 3. **Runtime** (`runtime`) - invoke, normalize, record, and render failures
//! 4. **Conversation** (`conversation`) - in-memory session store and history
//!
//! The model only writes prose. Purchase links in anything shown to a user are rebuilt or
//! checked by the normalizer, never trusted as sent.

pub mod conversation;
pub mod http;
pub mod instruction;
pub mod llm;
pub mod runtime;

pub use http::HttpAgentClient;
pub use llm::{AgentClient, AgentError, InvocationRequest, Turn};
pub use runtime::{AgentRuntime, ChatReply};
