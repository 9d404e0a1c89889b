//! Qdrant Vector Database Integration
//!
//! REST client and collection schema for storing chunk vectors in Qdrant.

pub mod client;
pub mod collections;

pub use client::QdrantIndex;
