pub mod capture;
pub mod detection;
pub mod persistence;
pub mod pipeline;
pub mod shared;
pub mod snapshot;
pub mod tracking;
