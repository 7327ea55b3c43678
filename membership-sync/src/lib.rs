//! Membership Sync: paid-membership roles driven by billing state
//!
//! A Rust library that keeps the roles of a group-chat server in line with
//! each member's subscription at a billing provider. Paying members hold the
//! Paying role (plus Lifetime after a one-off lifetime purchase); everyone
//! else holds Unknown. Roles the engine does not manage are never touched.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   commands   │   │   webhook    │   │  daily sweep │
//! └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!        │ immediate apply  │                  │ reminders
//! ┌──────▼──────────────────▼──────────────────▼───────┐
//! │                 MembershipEngine                   │
//! │  classify ─► target roles ─► diff ─► add, remove   │
//! └──┬──────────────┬──────────────┬──────────────┬────┘
//!    │              │              │              │
//! ┌──▼─────┐   ┌────▼─────┐   ┌────▼────┐   ┌─────▼────┐
//! │billing │   │ platform │   │  store  │   │ notifier │
//! │(Stripe)│   │(Discord) │   │ (JSON)  │   │(Discord) │
//! └────────┘   └──────────┘   └─────────┘   └──────────┘
//! ```
//!
//! Billing calls pass through a single-flight throttle (one request in
//! flight, at least one second apart) and a circuit breaker.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use membership_sync::{
//!     billing::StripeClient,
//!     config::SyncConfig,
//!     engine::{EngineSettings, MembershipEngine},
//!     platform::DiscordClient,
//!     store::JsonFileStore,
//! };
//!
//! # async fn example() -> membership_sync::Result<()> {
//! let config = SyncConfig::load(None)?;
//! let discord = DiscordClient::from_config(&config)?;
//! let engine = MembershipEngine::new(
//!     StripeClient::from_config(&config)?,
//!     discord.clone(),
//!     JsonFileStore::open("customers.json").await?,
//!     discord,
//!     EngineSettings::from_config(&config),
//! );
//!
//! let report = engine.run_sweep().await?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![allow(
    clippy::multiple_crate_versions,
    reason = "transitive dependencies from reqwest and wiremock"
)]

pub mod audit;
pub mod billing;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod ids;
pub mod membership;
pub mod notify;
pub mod platform;
pub mod reliability;
pub mod roles;
pub mod store;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod webhook;

pub use engine::{EngineSettings, MembershipEngine};
pub use error::{Result, SyncError};
