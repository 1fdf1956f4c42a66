pub mod connection;
pub mod http;
pub mod page;
pub mod poller;
pub mod status;
pub mod timer;

#[cfg(target_arch = "wasm32")]
mod logging;
#[cfg(target_arch = "wasm32")]
mod web;

#[cfg(test)]
mod testing;
