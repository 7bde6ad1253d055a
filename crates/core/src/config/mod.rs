mod cidr;
mod environment;
mod options;
mod types;
mod validation;

pub use cidr::{Ipv4Cidr, ANY_IPV4};
pub use environment::{
    Environment, ACCOUNT_VAR, DEFAULT_REGION, FALLBACK_REGION_VAR, REGION_VAR,
};
pub use options::*;
pub use types::{
    HealthCheckConfig, ImageConfig, LoadBalancerConfig, NetworkConfig, RepositoryConfig,
    SecurityProfile, ServiceConfig, StackConfig, TaskConfig,
};
pub use validation::{default_model_invocation_resources, validate_fargate_size};
