pub mod exchange;
pub mod price;
