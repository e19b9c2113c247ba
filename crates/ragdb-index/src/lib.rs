//! Index gateways: the remote vector/rerank service and an in-process
//! equivalent used offline and in tests.

pub mod filter;
pub mod memory;
pub mod pinecone;

pub use filter::matches_filter;
pub use memory::{lexical_relevance, MemoryGateway};
pub use pinecone::PineconeGateway;
