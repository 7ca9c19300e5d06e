//! Gym Buddy - per-session coaching actors behind a small REST API
//!
//! This crate provides the backend server: an HTTP front controller, one
//! ractor actor per chat session backed by a SQLite key-value store, a
//! model-inference client, and a durable step/sleep workflow runner.

pub mod actors;
pub mod api;
pub mod app_state;
pub mod config;
pub mod db;
pub mod inference;
pub mod store;
pub mod supervisor;
pub mod workflow;
