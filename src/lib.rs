//! Portcullis is an authentication gatekeeper that sits in front of one or
//! more protected applications. It validates PocketBase session cookies,
//! enforces group-based authorization, and either answers a reverse proxy's
//! ForwardAuth subrequests, serves protected static content itself, or
//! transparently proxies to an upstream application with identity headers
//! injected.

pub mod auth;
pub mod config;
pub mod gateway;
pub mod observability;
pub mod pages;
pub mod routes;
