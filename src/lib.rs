pub mod cancel;
pub mod commands;
pub mod engine;
pub mod journal;
pub mod output;
pub mod plan;
pub mod run;
pub mod tail;
pub mod timeline;
