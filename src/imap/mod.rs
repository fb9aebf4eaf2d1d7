pub mod client;
pub mod parse;
mod stream;

pub use client::ImapClient;
