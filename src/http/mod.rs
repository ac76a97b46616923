//! HTTP server and governance middleware.

mod middleware;
mod server;

pub use middleware::{client_ip, govern, Governance};
pub use server::HttpServer;
