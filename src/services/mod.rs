//! External collaborators behind narrow interfaces: the mutation queue,
//! the cache/batch layer, and the AI text-generation client.

pub mod ai;
pub mod cache;
pub mod queue;
