pub mod assemble;
pub mod data_load;
pub mod env_loader;
pub mod filtering;
pub mod graph_build;
pub mod models;
pub mod name_match;
pub mod server;
