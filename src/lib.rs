//! appshots - アプリのスクリーンショット投稿ウィザード（CLI）

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod interactive;
pub mod local;
pub mod scanner;
pub mod session_file;
