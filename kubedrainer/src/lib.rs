pub mod config;
pub mod error;
pub mod hookhandler;
pub mod nodeinfo;
