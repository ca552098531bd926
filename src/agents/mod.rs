//! Agent system
//!
//! - `config` - declarative agent definitions loaded from disk
//! - `domain` - core types (messages, tools, chat chunks, cancellation)
//! - `llm` - provider implementations with streaming
//! - `tools` - static/dynamic tool assembly, translation, delegation
//! - `mcp` - tool-source connections (stdio, sse, http)
//! - `retrieval` - embedding plus vector-store backends
//! - `runtime` - the per-agent execution pipeline
//! - `registry` - config loading and agent ownership
//! - `a2a` - asynchronous task protocol
//! - `discovery` - well-known capability cards

pub mod a2a;
pub mod config;
pub mod discovery;
pub mod domain;
pub mod error;
pub mod llm;
pub mod mcp;
pub mod registry;
pub mod retrieval;
pub mod runtime;
pub mod tools;

pub use config::AgentConfig;
pub use error::{AgentError, AgentResult, ErrorCode};
pub use registry::{AgentRegistry, AgentSummary};
pub use runtime::{RuntimeAgent, MAX_TOOL_STEPS};
