mod auth;
mod connection;
mod error;
mod middleware;
mod routes;
mod server;
mod state;

pub use auth::Principal;
pub use server::GatewayServer;
