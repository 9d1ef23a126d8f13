pub mod config;
pub mod export;
pub mod generate;
pub mod init;
pub mod project;
pub mod serve;
pub mod story;
