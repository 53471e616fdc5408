#![deny(clippy::await_holding_refcell_ref)]

pub mod client;
pub mod common;
pub mod policy;

#[cfg(test)]
pub(crate) mod tests;

pub type Error = crate::common::error::ScaleError;
pub type Result<T> = std::result::Result<T, Error>;

pub const NODESCALE_VERSION: &str = {
    match option_env!("NODESCALE_BUILD_VERSION") {
        Some(version) => version,
        None => const_format::concatcp!(env!("CARGO_PKG_VERSION"), "-dev"),
    }
};
