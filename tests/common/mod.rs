//! Shared test harness.

#![allow(dead_code)]

mod db;

pub mod models;
pub mod schema;

use failure::Error;

pub use self::db::{Connection, Database, Pool, Pooled, setup_db};

/// Run a test case against an exclusively locked, freshly cleared database.
pub fn run_test<F>(db: &Database, test: F)
where
    F: FnOnce(&Connection) -> Result<(), Error>,
{
    let _ = env_logger::builder().is_test(true).try_init();

    let result = db.lock(|pool| {
        let conn = pool.get()?;
        test(&conn)
    });

    if let Err(err) = result {
        panic!("{}", err);
    }
}
