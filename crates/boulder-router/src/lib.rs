//! Fallback routing for expert calls
//!
//! Classifies call failures once at the router boundary and walks the
//! configured fallback chain for retryable ones, dispatching hook events
//! around every attempt.

mod expert;
mod router;

pub use expert::{CallRequest, ExpertCaller, ExpertResponse, RoutedResponse};
pub use router::FallbackRouter;
