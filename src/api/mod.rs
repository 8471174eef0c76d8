//! Browser-facing web surface.
//!
//! Three form-driven pages (patient picker, plan result, PDF download)
//! plus a JSON health check. Handlers are thin: they hand blocking work to
//! [`CareWorkflow`](crate::workflow::CareWorkflow) on the blocking pool and
//! render the result as HTML.

pub mod endpoints;
pub mod error;
pub mod middleware;
pub mod pages;
pub mod router;
pub mod server;
pub mod types;

pub use router::care_router;
pub use server::{serve, ServerError};
pub use types::ApiContext;
