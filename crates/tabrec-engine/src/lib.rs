//! Capture-and-relay pipeline for recording a tab's console and network traffic.
//!
//! Three contexts exchange messages only:
//! page realm ([`page`], [`interceptor`]) → isolated relay ([`relay`]) → background [`store`].
//! [`controller`] is the UI-side client of the message protocol and [`browser`]
//! is an in-process host that wires tabs, pages and relays together.

pub mod browser;
pub mod buffer;
pub mod controller;
pub mod export;
pub mod interceptor;
pub mod page;
pub mod persistence;
pub mod relay;
pub mod store;

pub use tabrec_common::config;
pub use tabrec_common::error;
pub use tabrec_common::formatter;
pub use tabrec_common::protocol;
