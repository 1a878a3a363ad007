pub mod catalog;
pub mod config;
pub mod io;
pub mod session;
pub mod timer;
