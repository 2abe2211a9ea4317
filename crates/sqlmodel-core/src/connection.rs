//! The driver-facing connection contract.

use crate::error::Error;
use crate::row::Row;
use crate::value::Value;
use asupersync::{Cx, Outcome};
use std::future::Future;

/// A database connection.
///
/// Every call is one round trip; the session awaits each before issuing the
/// next, so implementations never see concurrent calls from one session.
pub trait Connection: Send + Sync {
    /// Run a query and return all rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Run a statement and return the affected row count.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;
}
