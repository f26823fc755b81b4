//! DougChat Server - Messages API, auth gateway and realtime relay.
//!
//! This crate provides the server component of DougChat, responsible for:
//! - Reading and inserting chat messages through a [`store::MessageStore`]
//! - Forwarding credentials to an [`auth::AuthProvider`] and tracking sessions
//! - Gating routes between the auth page and the chat
//! - Relaying insert events to realtime subscribers
//!
//! # Architecture
//!
//! Storage and auth are delegated to Supabase ([`supabase::SupabaseClient`]).
//! For local development, [`memory::MemoryBackend`] implements both roles in
//! process. The server itself only holds the realtime channel.

pub mod auth;
pub mod config;
pub mod error;
pub mod memory;
pub mod middleware;
pub mod pages;
pub mod realtime;
pub mod routes;
pub mod session;
pub mod store;
pub mod supabase;
pub mod types;
