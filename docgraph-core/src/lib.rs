//! Docgraph core library: deployment knowledge graph and SSG recommendation engine.
//!
//! The main entry point is [`graph::DocGraph`], which wires the entity
//! resolver, event tracker, analytics, preference manager and recommendation
//! pipeline to a single [`store::GraphStore`].

pub mod analyze;
pub mod config;
pub mod contracts;
pub mod error;
pub mod events;
pub mod graph;
pub mod preferences;
pub mod recommend;
pub mod resolve;
pub mod store;
pub mod types;
