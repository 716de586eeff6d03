//! Authentication core for the Alem tutoring marketplace.
//!
//! - [`auth`] -- the [`AuthService`](auth::AuthService) orchestrator (register,
//!   password login, OTP login, refresh rotation, logout).
//! - [`token`] -- HS256 access/refresh token signing and verification.
//! - [`store`] -- capability traits for identity, session, and OTP persistence,
//!   plus in-memory implementations.
//! - [`password`] / [`hashing`] / [`otp`] -- credential primitives.
//!
//! This crate performs no HTTP and no SQL; the `alem-db` crate provides
//! Postgres-backed stores and `alem-api` exposes the HTTP surface.

pub mod auth;
pub mod config;
pub mod error;
pub mod hashing;
pub mod identity;
pub mod otp;
pub mod password;
pub mod roles;
pub mod store;
pub mod token;
pub mod types;
