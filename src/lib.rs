pub mod args;
pub mod error;
pub mod logging;
pub mod metadata;
pub mod processor;
pub mod prompt;
pub mod remote;
pub mod retry;
pub mod scanner;
pub mod session;
pub mod summary;
pub mod uploader;

#[cfg(test)]
mod testing;
