pub mod aggregate;
pub mod app;
pub mod archive;
pub mod catalog;
pub mod config;
pub mod conversion;
pub mod converter;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod fs_util;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod script;
pub mod workspace;
