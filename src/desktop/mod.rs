pub mod clipboard;
pub mod notify;

pub use clipboard::{build_clipboard, swap_clipboard, CommandClipboard, UnavailableClipboard};
pub use notify::{build_notifier, CommandNotifier, LogNotifier};
