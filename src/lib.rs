pub mod pipeline;
pub mod seed;
pub mod store;
pub mod streamer_core;
