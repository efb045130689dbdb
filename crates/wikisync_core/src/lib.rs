pub mod blocks;
pub mod category;
pub mod check;
pub mod config;
pub mod deferred;
pub mod document;
pub mod error;
pub mod index_page;
pub mod notion;
pub mod parser;
pub mod purge;
pub mod reconcile;
pub mod runtime;
pub mod scan;
pub mod scheduler;

#[cfg(test)]
mod testing;
