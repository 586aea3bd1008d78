//! Workflow registry, state-based recommendation, and query routing.

mod descriptor;
mod discovery;
mod error;
mod recommend;
mod router;

pub use descriptor::{
    ArgSpec, ArgType, EffectSet, UniversalFlag, WorkflowDescriptor, parse_flags,
};
pub use discovery::WorkflowRegistry;
pub use error::RegistryError;
pub use recommend::{BundleState, Recommendation, observe_bundle, recommend};
pub use router::{
    CONFIDENCE_FALLBACK_THRESHOLD, QueryIntent, RoutedQuery, classify_query,
};
