//! # cardmill-store
//!
//! Durable state for cardmill: the job record store and the work queue.
//!
//! Redis is the production substrate (`RedisJobStore`, `RedisWorkQueue`);
//! the in-memory twins back tests and local development. All four implement
//! the trait seams from `cardmill-core`, so the gateway and dispatcher never
//! see the difference.

pub mod memory;
pub mod redis_queue;
pub mod redis_store;

pub use memory::{InMemoryJobStore, InMemoryWorkQueue};
pub use redis_queue::RedisWorkQueue;
pub use redis_store::RedisJobStore;
