use clap::Args;

/// Process-wide boolean flags read once at startup, stored in a single struct and passed down
/// through the reconciler context (§6, §9 "Global mutable state" -- read-only after startup, no
/// interior mutability needed).
#[derive(Args, Clone, Copy, Debug)]
pub struct FeatureGates {
    #[arg(long, env = "FEATURE_ORIGINATING_IDENTITY", default_value_t = false)]
    pub originating_identity: bool,

    #[arg(long, env = "FEATURE_SERVICE_PLAN_DEFAULTS", default_value_t = false)]
    pub service_plan_defaults: bool,

    #[arg(long, env = "FEATURE_ASYNC_BINDING_OPERATIONS", default_value_t = false)]
    pub async_binding_operations: bool,

    #[arg(long, env = "FEATURE_NAMESPACED_SERVICE_BROKER", default_value_t = true)]
    pub namespaced_service_broker: bool,

    #[arg(long, env = "FEATURE_CATALOG_RESTRICTIONS", default_value_t = false)]
    pub catalog_restrictions: bool,

    #[arg(long, env = "FEATURE_CASCADING_DELETION", default_value_t = false)]
    pub cascading_deletion: bool,

    #[arg(long, env = "FEATURE_UPDATE_DASHBOARD_URL", default_value_t = false)]
    pub update_dashboard_url: bool,
}

impl Default for FeatureGates {
    fn default() -> Self {
        FeatureGates {
            originating_identity: false,
            service_plan_defaults: false,
            async_binding_operations: false,
            namespaced_service_broker: true,
            catalog_restrictions: false,
            cascading_deletion: false,
            update_dashboard_url: false,
        }
    }
}
