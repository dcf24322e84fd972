pub mod contract;
pub mod models;
pub mod telegram;
