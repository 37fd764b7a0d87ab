//! Conditional update service.
//!
//! [`ConditionalUpsertEngine`] decides whether a `PUT [type]?[criteria]`
//! request becomes a create, an update-as-create, a version-checked update or
//! a rejection. [`Dispatcher`] validates inbound requests and shapes the
//! engine's result; [`build_app`] exposes it over HTTP.

pub mod conditional;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod observability;
pub mod server;

pub use conditional::{ConditionalOptions, ConditionalUpsertEngine, UpsertOutcome};
pub use config::AppConfig;
pub use dispatcher::{Dispatcher, WriteResponse};
pub use error::{ApiError, UpsertError};
pub use server::{AppState, ServerBuilder, UpsertServer, build_app, build_app_with_gateways};
