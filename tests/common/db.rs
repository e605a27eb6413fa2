//! Managing test databases.

use diesel::{connection::SimpleConnection, pg::PgConnection, prelude::*, Connection as _};
use diesel_migrations::{
    find_migrations_directory,
    run_pending_migrations_in_directory,
};
use failure::Error;
use r2d2_diesel::ConnectionManager;
use std::sync::Mutex;

pub type Connection = PgConnection;
pub type Pool = r2d2::Pool<ConnectionManager<PgConnection>>;
pub type Pooled = r2d2::PooledConnection<ConnectionManager<PgConnection>>;

pub struct Database {
    lock: Mutex<()>,
    pool: Pool,
}

impl Database {
    /// Obtain exclusive access to a clean test database.
    pub fn lock<F, R>(&self, f: F) -> Result<R, Error>
    where
        F: FnOnce(Pool) -> Result<R, Error>,
    {
        let _guard = match self.lock.lock() {
            Ok(guard) => guard,
            Err(poison) => poison.into_inner(),
        };

        let conn = self.pool.get()?;
        conn.batch_execute(CLEAR_DATABASE)?;

        f(self.pool.clone())
    }
}

/// Create a test database and apply all migrations to it.
///
/// Create one database per integration test suite, with `lazy_static`, and
/// take [`Database::lock`] around each test case:
///
/// ```ignore
/// lazy_static! {
///     static ref DATABASE: Database =
///         setup_db().expect("Cannot create test database");
/// }
/// ```
pub fn setup_db() -> Result<Database, Error> {
    let url = database_url();
    let create = std::env::var_os("TEST_DONT_CREATE_DATABASE").is_none();

    if create {
        // Re-create the test database, dropping the previous one if needed.
        eprintln!("Re-creating database. Set TEST_DONT_CREATE_DATABASE to skip");
        let (database, default_url) = change_database_of_url(&url);
        let conn = PgConnection::establish(&default_url)?;
        conn.batch_execute(
            &format!(r#"DROP DATABASE IF EXISTS "{}""#, database))?;
        conn.batch_execute(&format!(r#"CREATE DATABASE "{}""#, database))?;
    }

    let conn = PgConnection::establish(&url)?;

    if create {
        let migrations_dir = find_migrations_directory()?;
        run_pending_migrations_in_directory(
            &conn, &migrations_dir, &mut std::io::stderr())?;
    }

    Ok(Database {
        lock: Mutex::new(()),
        pool: Pool::new(ConnectionManager::new(url))?,
    })
}

/// Find correct database URL for testing.
fn database_url() -> String {
    if let Ok(url) = std::env::var("DATABASE_URL") {
        return url;
    }

    let mut url = "postgres://".to_string();

    if let Ok(user) = std::env::var("DATABASE_USER") {
        url.push_str(&user);
    }

    url.push('/');
    if let Ok(name) = std::env::var("DATABASE_NAME") {
        url.push_str(&name);
    } else {
        url.push_str("publisher-test");
    }

    url
}

/// Change connection URL to point to the default database. Return it and
/// name of the original database.
fn change_database_of_url(url: &str) -> (String, String) {
    let base = ::url::Url::parse(url).unwrap();
    let database = base.path_segments().unwrap().last().unwrap().to_owned();
    let mut new_url = base.join("postgres").unwrap();
    new_url.set_query(base.query());
    (database, new_url.into_string())
}

const CLEAR_DATABASE: &str = "
    TRUNCATE articles, article_attachments, tags, article_tags, article_links,
        pages, page_translations, page_links
    RESTART IDENTITY CASCADE;
";
