pub mod link;
pub mod utils;
