pub mod registry;
pub mod strategy;
