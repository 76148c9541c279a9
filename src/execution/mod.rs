pub mod executor;

pub use executor::DeploymentRunner;
