mod config_hint;
mod header_injector;
mod health_probe;

pub use config_hint::ConfigHintProvider;
pub use header_injector::HeaderInjector;
pub use health_probe::HealthProbe;
