pub mod api;
pub mod archive;
pub mod backend;
pub mod browser;
pub mod checkpoint;
pub mod classify;
pub mod config;
pub mod controller;
pub mod domain;
pub mod error;
pub mod ids;
pub mod output;
pub mod pacing;
pub mod report;
pub mod sink;
pub mod tui;
