//! Data Sources
//!
//! A source answers query fetches, usually from a server. It must eventually
//! call [`Query::source_did_fetch_query`]; until it does, the query stays
//! `LOADING`.

use super::query::Query;
use super::StoreKey;
use crate::error::Result;

/// Fetches query results on behalf of a [`Query`].
pub trait Source {
    fn fetch_query(&self, query: &Query) -> Result<()>;
}

/// A source backed by a closure.
///
/// The closure returns the store keys and state string for a query, or
/// `None` to leave the fetch unanswered.
pub struct FnSource<F> {
    fetch: F,
}

impl<F> FnSource<F>
where
    F: Fn(&Query) -> Option<(Vec<StoreKey>, String)>,
{
    pub fn new(fetch: F) -> Self {
        Self { fetch }
    }
}

impl<F> Source for FnSource<F>
where
    F: Fn(&Query) -> Option<(Vec<StoreKey>, String)>,
{
    fn fetch_query(&self, query: &Query) -> Result<()> {
        if let Some((store_keys, state)) = (self.fetch)(query) {
            query.source_did_fetch_query(store_keys, state);
        }
        Ok(())
    }
}
