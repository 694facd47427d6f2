//! # BizClaw Channels
//! Communication channel implementations.
//!
//! 25+ channels supported — comprehensive multi-platform architecture.

pub mod cli;
pub mod discord;
pub mod email;
pub mod telegram;
pub mod webhook;
pub mod whatsapp;
pub mod zalo;
pub mod slack;
pub mod adapters;
