//! TLS edge that carries every tunnel
//!
//! A single listener terminates client TLS for all exposed hostnames. The
//! certificate is chosen by SNI from the route table, and the decrypted stream
//! is proxied to the container behind that hostname. Starting a tunnel inserts
//! its route; stopping it removes the route.

pub mod routes;
pub mod server;
pub mod tunnel;

pub use routes::{BackendProtocol, EdgeRoute, EdgeRoutes};
pub use server::{EdgeError, EdgeServer, EdgeServerConfig};
pub use tunnel::{EdgeTransport, EdgeTunnel};
