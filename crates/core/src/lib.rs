pub mod detection;
pub mod persistence;
pub mod pipeline;
pub mod shared;
pub mod tracking;
pub mod video;
