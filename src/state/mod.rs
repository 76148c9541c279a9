pub mod concurrency;

pub use concurrency::DeploymentSlot;
