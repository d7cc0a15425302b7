#![doc = "blog-history-core: fetch a hosted blog's editorial history and replay it as git commits."]

//! This crate holds the whole pipeline: the entity model, the throttled and
//! cacheable content client, the history reconstructor and the sinks it
//! replays into.
//!
//! # Usage
//! Build a [`client::ContentClient`], then hand it to
//! [`reconstruct::export_to_git`] (or [`reconstruct::synchronise`] with any
//! [`contract::VersionControlSink`]).

pub mod cache;
pub mod client;
pub mod config;
pub mod contract;
pub mod error;
pub mod model;
pub mod reconstruct;
pub mod sink;
pub mod throttle;
