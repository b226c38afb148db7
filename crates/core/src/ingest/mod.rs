pub mod client;
pub mod normalize;
pub mod pipeline;
pub mod types;
