pub mod events;
pub mod export;
pub mod generate;
pub mod health;
pub mod projects;
pub mod stories;
