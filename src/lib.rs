pub mod config;
pub mod difficulty;
pub mod difficulty_csv;
pub mod feed;
pub mod fpl_fetch;
pub mod http_cache;
pub mod http_client;
pub mod logging;
pub mod session;
pub mod state;
pub mod store;
pub mod ticker;
