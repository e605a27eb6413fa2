#[macro_use] extern crate bitflags;
#[macro_use] extern crate diesel;
#[macro_use] extern crate log;
#[macro_use] extern crate serde_derive;

pub(crate) use self::config::Config;

#[macro_use] mod macros;

pub mod audit;
pub mod config;
pub mod db;
pub mod logging;
pub mod permissions;
pub mod utils;
pub mod versioning;

pub type Result<T, E=failure::Error> = std::result::Result<T, E>;
