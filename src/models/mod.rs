pub mod mapname;
pub mod query;
pub mod server;
