//! Contracts for the external service families the orchestrator calls into:
//! mail, calendar, task-board, and the shared OAuth token source. Each trait
//! is specified only at the call-site contract the core depends on; wire
//! protocol details live in the concrete `reqwest`-based implementations.

pub mod calendar;
pub mod error;
pub mod mail;
pub mod oauth;
pub mod task_board;
pub mod turn;

pub use error::{ErrorKind, ServiceError, ServiceResult};
pub use oauth::{OAuthTokenSource, RefreshTokenSource};
