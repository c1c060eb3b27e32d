mod bearer_token_injector;
mod http_config_hint;
mod http_health_probe;

pub use bearer_token_injector::{BearerTokenInjector, PUBLIC_ENDPOINTS};
pub use http_config_hint::{HttpConfigHint, StaticConfigHint};
pub use http_health_probe::{HttpHealthProbe, HEALTH_PATH};
