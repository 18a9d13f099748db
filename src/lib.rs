pub mod app;
pub mod cli;
pub mod config;
pub mod diagnostics;
pub mod output;
pub mod proxy;
pub mod replay;
pub mod route;
pub mod runner;
pub mod spec;
pub mod utils;
pub mod wordlist;

#[cfg(test)]
mod tests;
