//! Route registration and lookup.
//!
//! # Data Flow
//! ```text
//! RoutePlugin::routes() (generated tables)
//!     → binding.rs (RouteBinding: verb + pattern + method + body spec)
//!     → tree.rs (RoutingTree: path-segment tree, one slot per verb)
//!     → lookup(verb, path) → RouteMatch { binding, params }
//! ```
//!
//! # Design Decisions
//! - The tree is built once per plugin-set change and then only read
//! - Path segments are matched as-is (no percent-decoding)

pub mod binding;
pub mod tree;

pub use binding::{BodySpec, HttpVerb, RouteBinding, RoutePlugin, RouteTable, VERB_COUNT};
pub use tree::{LookupError, RouteError, RouteMatch, RouteSummary, RoutingTree, UrlParameter};
