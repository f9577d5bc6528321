pub mod appearance;
pub mod assignment;
pub mod detection;
pub mod tracker;
