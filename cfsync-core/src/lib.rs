#![doc = "cfsync-core: reconciliation pipeline for guide custom formats."]

//! This crate holds everything needed to converge a remote service's custom
//! formats onto the set selected from the guide: data models, the cache, the
//! processing and diffing stages, the persister and the orchestration.
//! Transport and CLI concerns live in the `cfsync` binary crate.
//!
//! # Usage
//! Implement [`contract::CustomFormatService`] for a remote target and call
//! [`synchronise::synchronise_all`] with a [`contract::GuideSource`].

pub mod cache;
pub mod config;
pub mod contract;
pub mod document;
pub mod error;
pub mod guide;
pub mod persister;
pub mod processor;
pub mod synchronise;
pub mod transaction;
