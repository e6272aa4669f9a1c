//! Resource type definitions
//!
//! Each type carries the timeouts its operations run under.

use rediscloud_core::provider::{ResourceTimeouts, ResourceType};

pub const SUBSCRIPTION: &str = "active_active_subscription";
pub const PEERING: &str = "active_active_subscription_peering";

macro_rules! define_resource_type {
    ($name:ident, $type_name:expr, $timeouts:expr, $updatable:expr) => {
        pub struct $name;
        impl ResourceType for $name {
            fn name(&self) -> &'static str {
                $type_name
            }
            fn timeouts(&self) -> ResourceTimeouts {
                $timeouts
            }
            fn updatable(&self) -> bool {
                $updatable
            }
        }
    };
}

define_resource_type!(
    ActiveActiveSubscriptionType,
    SUBSCRIPTION,
    ResourceTimeouts::minutes(30, 10, 30, 10),
    true
);
define_resource_type!(
    ActiveActivePeeringType,
    PEERING,
    ResourceTimeouts::minutes(10, 10, 10, 10),
    false
);

/// Returns all resource types supported by this provider
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(ActiveActiveSubscriptionType),
        Box::new(ActiveActivePeeringType),
    ]
}

/// Look up a resource type by name
pub fn resource_type(name: &str) -> Option<Box<dyn ResourceType>> {
    resource_types().into_iter().find(|t| t.name() == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn subscription_timeouts() {
        let timeouts = resource_type(SUBSCRIPTION).unwrap().timeouts();
        assert_eq!(timeouts.create, Duration::from_secs(30 * 60));
        assert_eq!(timeouts.read, Duration::from_secs(10 * 60));
        assert_eq!(timeouts.update, Duration::from_secs(30 * 60));
        assert_eq!(timeouts.delete, Duration::from_secs(10 * 60));
    }

    #[test]
    fn peering_is_replaced_not_updated() {
        let peering = resource_type(PEERING).unwrap();
        assert!(!peering.updatable());
        assert_eq!(peering.timeouts().create, Duration::from_secs(10 * 60));
    }

    #[test]
    fn unknown_type() {
        assert!(resource_type("subscription").is_none());
    }
}
