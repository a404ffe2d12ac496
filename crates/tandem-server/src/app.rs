//! The application's root router.

use crate::health::health_router;
use crate::registry::{Registry, RegistryBuilder, RegistryError};

/// Every feature router, mounted under its prefix.
pub fn app_router() -> RegistryBuilder {
    RegistryBuilder::new().merge("health", health_router())
}

/// The frozen root registry.
pub fn app_registry() -> Result<Registry, RegistryError> {
    app_router().build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_registry_paths() {
        let registry = app_registry().unwrap();
        assert_eq!(registry.paths(), vec!["health.check", "health.log", "health.ping"]);
    }
}
