//! State reconciliation engine for Hearth devices.
//!
//! Given a [`Schema`](hearth_model::Schema), a device's current state
//! document and a patch, the engine validates and coerces every value the
//! schema declares, merges it into the state and returns a
//! [`Diff`](hearth_model::Diff) naming exactly what changed, so callers know
//! what to report upstream.
//!
//! Problems come in two tiers:
//! - [`Violation`]: a bad value, an out-of-range number, an ambiguous array
//!   key. Logged through `tracing`, collected in the [`MergeReport`], and the
//!   field keeps its previous value while the rest of the patch applies.
//! - [`StateError`]: structural misuse such as an array where an object is
//!   declared. Aborts the merge and leaves the state document untouched.
//!
//! ```
//! use hearth_model::Schema;
//! use hearth_types::{Kind, Primitive};
//! use serde_json::{Map, json};
//!
//! let schema = Schema::builder()
//!     .field("on", Kind::scalar(Primitive::Bool).mandatory())
//!     .build()
//!     .unwrap();
//! let mut state = Map::new();
//! let diff = hearth_state::merge(&schema, &mut state, &json!({"on": "yes"})).unwrap();
//! assert!(diff.contains("on"));
//! assert_eq!(state["on"], json!(true));
//! ```

mod array;
mod error;
mod pass;
mod reconciler;
mod violation;

pub use error::{StateError, StateResult};
pub use reconciler::{MergeReport, Reconciler, ReconcilerConfig, merge};
pub use violation::Violation;
