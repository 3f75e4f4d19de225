//! # Cistern
//!
//! Composition root for the Cistern pools.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          cistern                             │
//! │                                                              │
//! │   ┌──────────────────┐        ┌──────────────────────────┐   │
//! │   │  RegistryConfig  │──────> │      PoolRegistry        │   │
//! │   │  (TOML)          │        │  • array pools by type   │   │
//! │   └──────────────────┘        │  • object pools by type  │   │
//! │                               │  • TextBuilderPool       │   │
//! │                               └────────────┬─────────────┘   │
//! │                                            │                 │
//! ├────────────────────────────────────────────┼─────────────────┤
//! │                       cistern_core         ▼                 │
//! │   ObjectPool · ArrayPool · PoolSlice · ObservableCollection  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - `config`: Registry configuration
//! - `registry`: Type-keyed pool ownership
//! - `text`: Pooled `String` builders

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod registry;
pub mod text;

// Re-export the core crate
pub use cistern_core as core;

pub use config::{RegistryConfig, TextConfig};
pub use error::{RegistryError, RegistryResult};
pub use registry::{PoolRegistry, Trimmable};
pub use text::TextBuilderPool;
