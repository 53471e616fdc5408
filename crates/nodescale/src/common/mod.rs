pub mod cli;
pub mod data_structures;
pub mod error;
pub mod macros;
pub mod parser;
pub mod rpc;
pub mod setup;
pub mod timeutils;

pub use data_structures::{Map, Set};

crate::define_id_type!(JobId, u32);
