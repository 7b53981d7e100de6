//! # Community payment server
//! This crate hosts the HTTP surface of the community payment gateway. It is responsible for:
//! * Serving balance, order, invite and commission requests from community users.
//! * Receiving asynchronous payment notifications from Alipay, WeChat Pay and Epay, and acknowledging them in the
//!   format each provider expects.
//! * Running the invite expiry worker.
//!
//! ## Configuration
//! The server is configured via environment variables. See [config](config/index.html) for more information.
//!
//! ## Identity
//! The server does not authenticate users itself. An upstream authentication gateway asserts the user id in the
//! `X-User-Id` header, and administrators additionally carry `X-User-Roles: admin`. See [auth](auth/index.html).
//!
//! ## Routes
//! * `/health`: A health check route that returns a 200 OK response.
//! * `/api/...`: User and administrator routes. See [routes](routes/index.html).
//! * `/notify/{alipay,wechat,epay}`: Provider notification webhooks. See [notify_routes](notify_routes/index.html).

pub mod auth;
pub mod cli;
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod expiry_worker;

pub mod helpers;
pub mod middleware;
pub mod notify_routes;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;
