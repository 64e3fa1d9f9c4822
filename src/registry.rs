//! Service Registry
//!
//! This module holds the registered services of a session and dispatches
//! incoming calls to them. Registration happens while a session is being
//! built; once serving, the map is only read, so a reader-writer lock
//! guards it and method handles are cloned out before any await point.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::errors::{error_codes, Error};
use crate::service::{IntoServiceInstance, Service, ServiceMethod};

/// Registry of services keyed by advertised name
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, Service>>,
}

impl ServiceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate an instance and register it under its derived name
    ///
    /// The resulting methods are exposed as `<name>.<method>`. Fails on
    /// nil instances, unnameable or methodless services, invalid method
    /// signatures, and duplicate names.
    pub fn add_service(&self, instance: impl IntoServiceInstance) -> Result<(), Error> {
        let instance = instance
            .into_instance()
            .ok_or_else(|| Error::Registration("Attempt to add nil service instance".to_string()))?;

        let service = Service::from_instance(instance)?;

        let mut services = self.services.write().unwrap();
        if services.contains_key(service.name()) {
            return Err(Error::Registration(format!(
                "Service already registered: {}",
                service.name()
            )));
        }
        services.insert(service.name().to_string(), service);
        Ok(())
    }

    /// Number of registered services
    pub fn num_services(&self) -> usize {
        self.services.read().unwrap().len()
    }

    /// Total number of methods across all registered services
    pub fn num_methods(&self) -> usize {
        let services = self.services.read().unwrap();
        services.values().map(Service::num_methods).sum()
    }

    /// Sorted `service -> methods` inventory, for diagnostics and tests
    pub fn method_inventory(&self) -> Vec<(String, Vec<String>)> {
        let services = self.services.read().unwrap();
        let mut inventory: Vec<(String, Vec<String>)> = services
            .values()
            .map(|service| (service.name().to_string(), service.method_names()))
            .collect();
        inventory.sort();
        inventory
    }

    /// Resolve a method by name using the `<service>.<method>` notation
    pub fn get_method(&self, name: &str) -> Result<Arc<ServiceMethod>, Error> {
        let parts: Vec<&str> = name.split('.').collect();
        let (service_name, method_name) = match parts.as_slice() {
            [service, method] if !service.is_empty() && !method.is_empty() => (*service, *method),
            _ => {
                return Err(Error::rpc(
                    error_codes::METHOD_NOT_FOUND,
                    format!("Invalid method name: {name}"),
                ))
            }
        };

        let services = self.services.read().unwrap();
        let service = services.get(service_name).ok_or_else(|| {
            Error::rpc(error_codes::METHOD_NOT_FOUND, format!("API not found: {service_name}"))
        })?;
        service.method(method_name).ok_or_else(|| {
            Error::rpc(
                error_codes::METHOD_NOT_FOUND,
                format!("API {service_name} doesn't have the {method_name} method"),
            )
        })
    }

    /// Call an exposed method with its raw JSON params
    ///
    /// Events always yield `Ok(None)`; calls yield the handler's value or
    /// its error. Decode failures come back verbatim so the session can
    /// report them as invalid params.
    pub async fn call_method(
        &self,
        name: &str,
        params: Option<Value>,
    ) -> Result<Option<Value>, Error> {
        let method = self.get_method(name)?;
        let value = method.invoke(params).await?;
        if method.is_event() {
            return Ok(None);
        }
        Ok(Some(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{MethodDef, OutputKind, Param, ServiceObject};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct Totals {
        count: i64,
    }

    impl Param for Totals {
        const OBJECT: bool = true;
    }

    struct CounterService;

    impl CounterService {
        fn total(&self, totals: Totals) -> Result<i64, Error> {
            Ok(totals.count)
        }
    }

    impl ServiceObject for CounterService {
        fn describe(self: Arc<Self>) -> Vec<MethodDef> {
            let svc = Arc::clone(&self);
            vec![
                MethodDef::call("ApiTotal", move |(totals,): (Totals,)| {
                    let svc = svc.clone();
                    async move { svc.total(totals) }
                }),
                MethodDef::event("ApiReset", |_: ()| async {}),
            ]
        }
    }

    struct EmptyService;

    impl ServiceObject for EmptyService {
        fn describe(self: Arc<Self>) -> Vec<MethodDef> {
            Vec::new()
        }
    }

    struct UnnamedService;

    impl ServiceObject for UnnamedService {
        fn type_name(&self) -> &'static str {
            ""
        }

        fn describe(self: Arc<Self>) -> Vec<MethodDef> {
            vec![MethodDef::event("ApiNoop", |_: ()| async {})]
        }
    }

    struct MissingMethodService;

    impl ServiceObject for MissingMethodService {
        fn methods(&self) -> Option<HashMap<String, String>> {
            Some(HashMap::from([
                ("noop".to_string(), "Noop".to_string()),
                ("fail_here".to_string(), "not_exported".to_string()),
            ]))
        }

        fn describe(self: Arc<Self>) -> Vec<MethodDef> {
            vec![MethodDef::event("Noop", |_: ()| async {})]
        }
    }

    struct TooManyOutputsService;

    impl ServiceObject for TooManyOutputsService {
        fn describe(self: Arc<Self>) -> Vec<MethodDef> {
            vec![MethodDef::call("ApiManyOutputs", |(n,): (i64,)| async move { Ok(n) })
                .with_outputs(vec![OutputKind::Value, OutputKind::Value, OutputKind::Error])]
        }
    }

    struct NoErrorOutputService;

    impl ServiceObject for NoErrorOutputService {
        fn describe(self: Arc<Self>) -> Vec<MethodDef> {
            vec![MethodDef::call("ApiNoErr", |(n,): (i64,)| async move { Ok(n) })
                .with_outputs(vec![OutputKind::Value, OutputKind::Value])]
        }
    }

    fn expect_registration_error(result: Result<(), Error>, needle: &str) {
        let err = result.expect_err("registration should have failed");
        assert!(err.to_string().contains(needle), "unexpected error: {err}");
    }

    #[test]
    fn rejects_nil_instance() {
        let registry = ServiceRegistry::new();
        expect_registration_error(
            registry.add_service(None::<Arc<dyn ServiceObject>>),
            "Attempt to add nil service instance",
        );
    }

    #[test]
    fn rejects_service_without_methods() {
        let registry = ServiceRegistry::new();
        expect_registration_error(
            registry.add_service(Arc::new(EmptyService)),
            "No exposed methods found",
        );
    }

    #[test]
    fn rejects_unnameable_service() {
        let registry = ServiceRegistry::new();
        expect_registration_error(
            registry.add_service(Arc::new(UnnamedService)),
            "Unable to get a name for",
        );
    }

    #[test]
    fn rejects_mapping_to_missing_method() {
        let registry = ServiceRegistry::new();
        expect_registration_error(
            registry.add_service(Arc::new(MissingMethodService)),
            "not_exported is not a method of",
        );
    }

    #[test]
    fn rejects_three_output_method() {
        let registry = ServiceRegistry::new();
        expect_registration_error(
            registry.add_service(Arc::new(TooManyOutputsService)),
            "Method 'ApiManyOutputs' must have 0 or 2 outputs",
        );
    }

    #[test]
    fn rejects_method_without_error_channel() {
        let registry = ServiceRegistry::new();
        expect_registration_error(
            registry.add_service(Arc::new(NoErrorOutputService)),
            "Method 'ApiNoErr' last output must be of type error",
        );
    }

    #[test]
    fn rejects_duplicate_service_name() {
        let registry = ServiceRegistry::new();
        registry.add_service(Arc::new(CounterService)).unwrap();
        expect_registration_error(
            registry.add_service(Arc::new(CounterService)),
            "Service already registered: CounterService",
        );
    }

    #[test]
    fn counts_services_and_methods() {
        let registry = ServiceRegistry::new();
        registry.add_service(Arc::new(CounterService)).unwrap();
        assert_eq!(registry.num_services(), 1);
        assert_eq!(registry.num_methods(), 2);
    }

    #[test]
    fn registration_is_repeatable_on_fresh_registries() {
        let first = ServiceRegistry::new();
        first.add_service(Arc::new(CounterService)).unwrap();
        let second = ServiceRegistry::new();
        second.add_service(Arc::new(CounterService)).unwrap();
        assert_eq!(first.method_inventory(), second.method_inventory());
    }

    #[test]
    fn get_method_validates_the_name_shape() {
        let registry = ServiceRegistry::new();
        registry.add_service(Arc::new(CounterService)).unwrap();

        for name in ["testing", "a.b.c", ".Total", "CounterService."] {
            let err = registry.get_method(name).unwrap_err();
            assert!(
                err.to_string().contains("Invalid method name"),
                "name {name:?} gave: {err}"
            );
        }
    }

    #[test]
    fn get_method_reports_unknown_service_and_method() {
        let registry = ServiceRegistry::new();
        registry.add_service(Arc::new(CounterService)).unwrap();

        let err = registry.get_method("yada.yada").unwrap_err();
        assert!(err.to_string().contains("API not found: yada"));

        let err = registry.get_method("CounterService.yada").unwrap_err();
        assert!(err
            .to_string()
            .contains("API CounterService doesn't have the yada method"));
    }

    #[tokio::test]
    async fn call_method_returns_value_for_calls_and_none_for_events() {
        let registry = ServiceRegistry::new();
        registry.add_service(Arc::new(CounterService)).unwrap();

        let value = registry
            .call_method("CounterService.Total", Some(json!({"count": 9})))
            .await
            .unwrap();
        assert_eq!(value, Some(json!(9)));

        let value = registry.call_method("CounterService.Reset", Some(json!([]))).await.unwrap();
        assert_eq!(value, None);
    }
}
