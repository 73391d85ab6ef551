//! `HookBridge` Server
//!
//! Relays provider webhooks to bot clients over WebSocket. Each bot connects
//! under its secret; each webhook posted with that secret is either answered
//! as a signed verification challenge or pushed verbatim to the bot.

pub mod api;
pub mod config;
pub mod observability;
pub mod registry;
pub mod util;
pub mod webhook;
pub mod ws;
