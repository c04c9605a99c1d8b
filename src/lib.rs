pub mod ads;
pub mod batch;
pub mod config;
pub mod error;
pub mod fetch;
pub mod merge;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod poller;
pub mod resolver;
pub mod submit;
