//! Azure interaction module
//!
//! Everything that touches the outside world lives here: running the Azure
//! CLI and classifying its failures.
//!
//! # Module Structure
//!
//! - [`cli`] - `az graph query` backed [`QuerySource`](crate::resource::QuerySource)
//! - [`error`] - Query error type and user-facing formatting
//!
//! # Example
//!
//! ```ignore
//! use azinfo::azure::AzCliQuery;
//! use azinfo::resource::{QuerySource, QueryTarget};
//!
//! async fn example() -> anyhow::Result<()> {
//!     let az = AzCliQuery::default();
//!     let rows = az.query(&QueryTarget::parse("all")).await?;
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;

pub use cli::{AzCliQuery, DEFAULT_AZ_PATH, DEFAULT_TIMEOUT};
pub use error::{format_query_error, QueryError};
