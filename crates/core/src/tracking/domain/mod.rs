pub mod association;
pub mod identity_registry;
pub mod motion_estimator;
pub mod tracker_config;
