//! # Governance
//!
//! Reads governance data from the proposal and delegate subgraphs and keeps a
//! local copy of delegate balances.
//!
//! ## Components
//! - [`walker`]: drains skip/first paginated feeds until an empty page
//! - [`aggregate`]: sums vote weights per support category
//! - [`sync`]: re-syncs stored delegate balances, safe to re-run
//! - [`reveal`]: shows an already fetched list one page at a time
//!
//! ## Flow
//! - Proposals: walker over four creation feeds, sorted, shown through a reveal window
//! - Votes: walker over two vote feeds per proposal, aggregated into a tally
//! - Balances: store pages, one top-1 subgraph lookup per delegate, upsert
//!
//! ## Clients
//! - One [`client::GraphClient`] per subgraph and one store handle are created at
//!   process start and passed into every component
//! - Handles are dropped on shutdown; nothing is held in globals

pub mod aggregate;
pub mod client;
pub mod config;
pub mod database;
pub mod error;
pub mod format;
pub mod memory;
pub mod proposals;
pub mod queries;
pub mod reveal;
pub mod sync;
pub mod utils;
pub mod walker;

pub use error::{GovernanceError, Result};
