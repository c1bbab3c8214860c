//! Routine catalog lookups.
//!
//! The backend lists every debuggable routine as `(signature, id)` where the
//! signature carries the parameter list, e.g. `f(integer)`. Resolution
//! matches a call head against the signature prefix before the parameter
//! list; with several overloads the first match in listing order wins,
//! which is an accepted limitation rather than an error.

use log::info;

use crate::driver::Connection;
use crate::error::Result;
use crate::types::{col_str, col_u32};

/// One debuggable routine known to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Routine {
    pub signature: String,
    pub id: u32,
}

/// Fetches every debuggable routine from the backend.
pub fn list_routines(conn: &mut Connection) -> Result<Vec<Routine>> {
    info!("listing debuggable routines");
    let rows = conn.execute("list_routines()", true)?;
    rows.iter()
        .map(|row| {
            Ok(Routine {
                signature: col_str(row, 0)?,
                id: col_u32(row, 1)?,
            })
        })
        .collect()
}

/// Resolves a call head to a routine id by prefix match.
///
/// Returns `None` when nothing matches; an absent routine is "not found",
/// not a failure.
pub fn resolve(routines: &[Routine], head: &str) -> Option<u32> {
    routines
        .iter()
        .find(|routine| routine.signature.split('(').next() == Some(head))
        .map(|routine| routine.id)
}
