//! # Crash Digest
//!
//! Turns the plain-text crash reports a desktop application uploads to an
//! object store into a browsable, day-indexed static site.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────────┐   ┌────────────┐   ┌──────────┐
//! │ Object store │──▶│ fetch (64 tasks) │──▶│ filter +   │──▶│ render + │
//! │ S3 / dir     │   │ cache/parse/link │   │ sort/day   │   │ publish  │
//! └──────────────┘   └──────────────────┘   └────────────┘   └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! crashd run --config ./config/crashd.toml               # fetch, render, publish
//! crashd run --no-publish                                # stop after rendering
//! crashd parse ./data/crashes/2026-10-18/abc.txt          # inspect one report
//! crashd days                                            # what is cached locally
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`version`] | `Ver:` line parsing |
//! | [`parse`] | Crash report text parsing |
//! | [`symbolicate`] | Stack frame → source link mapping |
//! | [`store`] | Object store abstraction (S3, directory) |
//! | [`fetch`] | Concurrent fetch/cache/delete decisions |
//! | [`aggregate`] | Visibility filters and per-day ordering |
//! | [`render`] | Static HTML pages |
//! | [`publish`] | Site archive upload |
//! | [`pipeline`] | End-to-end run |
//! | [`progress`] | Fetch progress on stderr |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`days`] | Local cache overview |
//! | [`inspect`] | Single-report inspection |

pub mod aggregate;
pub mod config;
pub mod days;
pub mod fetch;
pub mod inspect;
pub mod logging;
pub mod models;
pub mod parse;
pub mod pipeline;
pub mod progress;
pub mod publish;
pub mod render;
pub mod store;
pub mod symbolicate;
pub mod version;
