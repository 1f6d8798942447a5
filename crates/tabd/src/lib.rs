pub mod cli;
pub mod client_server;
pub mod controller;
pub mod error;
pub mod logging;
pub mod styles;
