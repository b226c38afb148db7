pub mod recommendation;
pub mod stock;
