//! Rings: isolated script contexts
//!
//! A [`Rings`] manager owns a host context and creates [`Ring`]s: fully
//! independent interpreter instances that only exchange values by copy.
//!
//! - **Marshalling** (`marshal`): deep copies between evaluation stacks,
//!   preserving shared references and cycles within one transfer
//! - **Chunk cache** (`chunk_cache`): source text -> compiled chunk, swept
//!   when nothing else holds the chunk
//! - **Registry** (`registry`): enclosing environments and caller
//!   registrations, keyed by ring
//! - **Remote calls** (`remote`): forward `dostring` and reverse
//!   `remotedostring`, with failures returned as data
//! - **Script library** (`library`): the `rings` table seen by scripts
//!
//! # Example
//!
//! ```rust,ignore
//! use rings_core::{CallOutcome, Rings};
//! use rings_engine::Value;
//!
//! let rings = Rings::new()?;
//! let ring = rings.create(None)?;
//! match ring.dostring("return ... * 2", vec![Value::Number(21.0)])? {
//!     CallOutcome::Success(values) => assert_eq!(values, vec![Value::Number(42.0)]),
//!     CallOutcome::Failure(err) => eprintln!("failed: {}", err),
//! }
//! ```

#![warn(rust_2018_idioms)]

pub mod chunk_cache;
pub mod context;
pub mod engine;
pub mod error;
pub mod library;
pub mod lifecycle;
pub mod marshal;
pub mod options;
mod registry;
pub mod remote;

pub use chunk_cache::ChunkCache;
pub use context::{RingContext, RingId};
pub use engine::{Engine, StdEngine};
pub use error::{RemoteError, RingsError};
pub use lifecycle::{GcReport, Ring, Rings};
pub use marshal::{copy_values, Direction, MarshalError};
pub use options::{ConfigError, RingsOptions, DEFAULT_CACHE_SWEEP_THRESHOLD, DEFAULT_MAX_COPY_DEPTH};
pub use remote::CallOutcome;

/// Opaque host handles cross rings by identity.
pub use rings_engine::OpaqueRef;
