//! Identity and counter plumbing for the Snippy code-sharing service.
//!
//! The crate owns three concerns:
//!
//! - **Identifier assignment**: snippet short IDs and usernames are drawn at
//!   random, probed against the store, retried with exponential backoff on
//!   collision and replaced by a timestamp-based fallback once the retry
//!   budget is spent.
//! - **Connection resilience**: store connectivity errors go through a
//!   separate retry policy wrapped around a circuit breaker.
//! - **Counter maintenance**: fork, favorite and comment counts on a snippet
//!   are adjusted relatively, inside the same transaction as the child row
//!   that caused them.
//!
//! [`SnippetService`] ties these together over any [`Store`]; the bundled
//! [`MemoryStore`] is a transactional reference adapter.
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> snippy::Result<()> {
//! use std::sync::Arc;
//! use snippy::{IdentityConfig, MemoryStore, ServiceContext, SnippetDraft, SnippetService};
//!
//! let context = Arc::new(ServiceContext::new(&IdentityConfig::default())?);
//! let service = SnippetService::new(MemoryStore::new(), context);
//!
//! let user = service.register_user(Some("Ada Lovelace"), "auth0|ada").await?;
//! let snippet = service
//!     .create_snippet(user.id, SnippetDraft::titled("hello"))
//!     .await?;
//! assert_eq!(snippet.short_id.len(), 7);
//! # Ok(())
//! # }
//! ```

mod alphabet;
mod candidate;
mod config;
mod context;
mod counter;
mod error;
mod observe;
mod rand;
mod retry;
mod service;
mod sleep;
mod store;
#[cfg(test)]
mod test_support;
mod time;

pub use crate::alphabet::*;
pub use crate::candidate::*;
pub use crate::config::*;
pub use crate::context::*;
pub use crate::counter::*;
pub use crate::error::*;
pub use crate::observe::*;
pub use crate::rand::*;
pub use crate::retry::*;
pub use crate::service::*;
pub use crate::sleep::*;
pub use crate::store::*;
pub use crate::time::*;
