//! Data-side of the engine: the passive [`cache::DataCache`], the
//! [`source::DataSource`] fetcher seam, and the [`poll::PollingManager`]
//! that refreshes each source on its own cadence.

pub mod cache;
pub mod poll;
pub mod source;
