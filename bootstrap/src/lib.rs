//! Event-sourced organization bootstrap workflow.
//!
//! An append-only event log (see [`event`], [`store`]) drives a set of
//! synchronous, in-transaction read-model projections (see [`projection`]) and
//! an explicit saga state machine (see [`saga`]) that provisions a new
//! organization end to end: create the organization, configure and verify its
//! subdomain, seed its default RBAC roles, generate and email admin
//! invitations, then activate it — or unwind everything it already did if any
//! step fails terminally.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod api;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod identity;
pub mod projection;
pub mod providers;
pub mod queue;
pub mod saga;
pub mod store;
pub mod stream;
