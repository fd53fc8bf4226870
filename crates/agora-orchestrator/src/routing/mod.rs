//! Provider/model selection and per-model pricing.
//!
//! Routing is deterministic and synchronous: it consults credential presence
//! through the adapter registry and fixed candidate tables, never the network.

pub mod cost;
pub mod router;

pub use cost::{CostTable, TokenRates};
pub use router::ModelRouter;
