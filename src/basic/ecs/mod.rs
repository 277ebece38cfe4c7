pub mod network;
pub mod plugin;
