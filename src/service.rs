//! Service Objects and Method Descriptors
//!
//! This module defines how application services expose methods on the wire.
//! A service implements [`ServiceObject`] and hands out a method table of
//! [`MethodDef`] descriptors; registration validates the table (output
//! arity, trailing error channel, discovery mode) and produces the
//! dispatchable [`Service`]. Parameter decoding follows the JSON-RPC
//! conventions of the protocol: positional arrays by default, with a
//! single-object shorthand for methods taking one record argument.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::errors::Error;

/// Default prefix for exposed methods of registered services
pub const DEFAULT_METHOD_PREFIX: &str = "Api";

/// An opaque service instance that can be registered with a session
///
/// `name`, `prefix`, and `methods` are opt-in capabilities; the defaults
/// give prefix-based discovery under the service's own type name.
pub trait ServiceObject: Send + Sync + 'static {
    /// Runtime type identifier, used for registration errors and as the
    /// name fallback
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Advertised service name; overrides the type-derived name
    fn name(&self) -> Option<String> {
        None
    }

    /// Replacement prefix for prefix-based method discovery
    fn prefix(&self) -> Option<String> {
        None
    }

    /// Explicit mapping from advertised name to internal method name;
    /// mutually exclusive with prefix-based discovery
    fn methods(&self) -> Option<HashMap<String, String>> {
        None
    }

    /// The full method table of this instance
    fn describe(self: Arc<Self>) -> Vec<MethodDef>;
}

/// Conversion into the nullable instance accepted by registration
///
/// Dynamic service factories hand the registry a list that may contain
/// holes; typed callers pass an `Arc` directly.
pub trait IntoServiceInstance {
    fn into_instance(self) -> Option<Arc<dyn ServiceObject>>;
}

impl<S: ServiceObject> IntoServiceInstance for Arc<S> {
    fn into_instance(self) -> Option<Arc<dyn ServiceObject>> {
        Some(self)
    }
}

impl IntoServiceInstance for Arc<dyn ServiceObject> {
    fn into_instance(self) -> Option<Arc<dyn ServiceObject>> {
        Some(self)
    }
}

impl IntoServiceInstance for Option<Arc<dyn ServiceObject>> {
    fn into_instance(self) -> Option<Arc<dyn ServiceObject>> {
        self
    }
}

/// A type usable as a method argument
///
/// `OBJECT` marks record-like types that may receive the whole `params`
/// object when they are a method's only argument. Record types opt in with
/// a one-line impl.
pub trait Param: DeserializeOwned + Send + 'static {
    /// True when the type decodes from a JSON object and participates in
    /// the single-argument object form of `params`
    const OBJECT: bool = false;
}

macro_rules! scalar_params {
    ($($ty:ty),+ $(,)?) => {
        $(impl Param for $ty {})+
    };
}

scalar_params!(bool, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String);

impl Param for Value {}

impl<T: DeserializeOwned + Send + 'static> Param for Vec<T> {}

impl<T: DeserializeOwned + Send + 'static> Param for HashMap<String, T> {}

/// Pointer-kinded arguments decode the same as their pointed-to type; a
/// JSON `null` yields `None`.
impl<T: Param> Param for Option<T> {
    const OBJECT: bool = T::OBJECT;
}

/// Shape-check `params` as a positional array of `expected` elements
///
/// Absent and `null` params count as the empty array.
fn positional_args(expected: usize, params: Option<Value>) -> Result<Vec<Value>, Error> {
    let elements = match params {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(Error::invalid_params("Params must be an array")),
    };
    if elements.len() != expected {
        return Err(Error::invalid_params(format!(
            "Wrong number of arguments, expected: {}, got: {}",
            expected,
            elements.len()
        )));
    }
    Ok(elements)
}

/// Decode one positional element into its argument type
fn decode_arg<T: Param>(index: usize, raw: Value) -> Result<T, Error> {
    serde_json::from_value(raw)
        .map_err(|err| Error::invalid_params(format!("Unable to decode parameter {index}: {err}")))
}

/// An argument tuple decodable from a raw JSON `params` value
pub trait Params: Sized + Send + 'static {
    fn decode(params: Option<Value>) -> Result<Self, Error>;
}

impl Params for () {
    fn decode(params: Option<Value>) -> Result<Self, Error> {
        positional_args(0, params)?;
        Ok(())
    }
}

// The unary tuple carries the object shorthand: a lone record argument may
// be sent as a JSON object instead of a one-element array.
impl<A: Param> Params for (A,) {
    fn decode(params: Option<Value>) -> Result<Self, Error> {
        match params {
            Some(Value::Object(fields)) if A::OBJECT => {
                let decoded = serde_json::from_value(Value::Object(fields))
                    .map_err(|_| Error::invalid_params("Params must be an object"))?;
                Ok((decoded,))
            }
            other => {
                let mut args = positional_args(1, other)?.into_iter();
                Ok((decode_arg(0, args.next().unwrap_or(Value::Null))?,))
            }
        }
    }
}

macro_rules! tuple_params {
    ($count:expr => $($ty:ident : $idx:expr),+) => {
        impl<$($ty: Param),+> Params for ($($ty,)+) {
            fn decode(params: Option<Value>) -> Result<Self, Error> {
                let mut args = positional_args($count, params)?.into_iter();
                Ok(($(decode_arg::<$ty>($idx, args.next().unwrap_or(Value::Null))?,)+))
            }
        }
    };
}

tuple_params!(2 => A1: 0, A2: 1);
tuple_params!(3 => A1: 0, A2: 1, A3: 2);
tuple_params!(4 => A1: 0, A2: 1, A3: 2, A4: 3);
tuple_params!(5 => A1: 0, A2: 1, A3: 2, A4: 3, A5: 4);

/// One declared output of a method signature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// A JSON-encodable return value
    Value,
    /// The trailing error channel
    Error,
}

type InvokeFn = Arc<dyn Fn(Option<Value>) -> BoxFuture<'static, Result<Value, Error>> + Send + Sync>;

/// A raw method descriptor in a service's method table
///
/// The typed constructors declare the canonical output signatures. The
/// decoder and handler are fused into one closure built at construction,
/// so dispatch never inspects argument types again.
pub struct MethodDef {
    name: &'static str,
    outputs: Vec<OutputKind>,
    invoke: InvokeFn,
}

impl MethodDef {
    /// Describe a call: decodes `P`, runs the handler, encodes its value
    pub fn call<P, R, F, Fut>(name: &'static str, handler: F) -> Self
    where
        P: Params,
        R: Serialize + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, Error>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self {
            name,
            outputs: vec![OutputKind::Value, OutputKind::Error],
            invoke: Arc::new(move |params| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let args = P::decode(params)?;
                    let value = handler(args).await?;
                    Ok(serde_json::to_value(value)?)
                })
            }),
        }
    }

    /// Describe an event: decodes `P`, runs the handler, yields nothing
    pub fn event<P, F, Fut>(name: &'static str, handler: F) -> Self
    where
        P: Params,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler = Arc::new(handler);
        Self {
            name,
            outputs: Vec::new(),
            invoke: Arc::new(move |params| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let args = P::decode(params)?;
                    handler(args).await;
                    Ok(Value::Null)
                })
            }),
        }
    }

    /// Override the declared output signature
    ///
    /// For method tables mirrored from foreign signatures whose shapes the
    /// typed constructors cannot express; registration still validates the
    /// declared signature.
    pub fn with_outputs(mut self, outputs: Vec<OutputKind>) -> Self {
        self.outputs = outputs;
        self
    }

    /// Internal method name as listed in the table
    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// A validated, dispatchable method of a registered service
pub struct ServiceMethod {
    public_name: String,
    is_event: bool,
    invoke: InvokeFn,
}

impl std::fmt::Debug for ServiceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceMethod")
            .field("public_name", &self.public_name)
            .field("is_event", &self.is_event)
            .finish()
    }
}

impl ServiceMethod {
    fn from_def(public_name: String, def: &MethodDef) -> Result<Self, Error> {
        let is_event = match def.outputs.len() {
            0 => true,
            2 if def.outputs[1] == OutputKind::Error => false,
            2 => {
                return Err(Error::Registration(format!(
                    "Method '{}' last output must be of type error",
                    def.name
                )))
            }
            n => {
                return Err(Error::Registration(format!(
                    "Method '{}' must have 0 or 2 outputs, found: {}",
                    def.name, n
                )))
            }
        };
        Ok(Self { public_name, is_event, invoke: Arc::clone(&def.invoke) })
    }

    /// Name advertised on the wire
    pub fn public_name(&self) -> &str {
        &self.public_name
    }

    /// True when the method yields no outputs
    pub fn is_event(&self) -> bool {
        self.is_event
    }

    /// Decode `params` and run the handler
    pub(crate) async fn invoke(&self, params: Option<Value>) -> Result<Value, Error> {
        (self.invoke)(params).await
    }
}

/// A registered service: advertised name plus its validated methods
pub struct Service {
    name: String,
    type_name: &'static str,
    methods: HashMap<String, Arc<ServiceMethod>>,
}

fn short_type_name(full: &str) -> &str {
    full.rsplit("::").next().unwrap_or(full)
}

impl Service {
    /// Introspect an instance into a registered service
    pub(crate) fn from_instance(instance: Arc<dyn ServiceObject>) -> Result<Self, Error> {
        let type_name = instance.type_name();

        let mut name = instance.name().unwrap_or_default();
        if name.is_empty() {
            name = short_type_name(type_name).to_string();
        }
        if name.is_empty() {
            return Err(Error::Registration(format!("Unable to get a name for: {type_name}")));
        }

        let explicit = instance.methods();
        let prefix = instance.prefix().unwrap_or_else(|| DEFAULT_METHOD_PREFIX.to_string());
        let defs = instance.describe();

        let mut methods = HashMap::new();
        match explicit {
            Some(mapping) => {
                for (public, internal) in mapping {
                    let def = defs.iter().find(|def| def.name == internal).ok_or_else(|| {
                        Error::Registration(format!("{internal} is not a method of {type_name}"))
                    })?;
                    methods.insert(public.clone(), Arc::new(ServiceMethod::from_def(public, def)?));
                }
            }
            None => {
                for def in &defs {
                    if let Some(public) = def.name.strip_prefix(prefix.as_str()) {
                        let method = ServiceMethod::from_def(public.to_string(), def)?;
                        methods.insert(public.to_string(), Arc::new(method));
                    }
                }
            }
        }

        if methods.is_empty() {
            return Err(Error::Registration(format!("No exposed methods found for {type_name}")));
        }

        Ok(Self { name, type_name, methods })
    }

    /// Advertised service name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runtime type the service was built from
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Number of exposed methods
    pub fn num_methods(&self) -> usize {
        self.methods.len()
    }

    pub(crate) fn method(&self, name: &str) -> Option<Arc<ServiceMethod>> {
        self.methods.get(name).cloned()
    }

    /// Advertised method names, for inventory comparisons
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct Record {
        number: i64,
        name: String,
    }

    impl Param for Record {
        const OBJECT: bool = true;
    }

    fn expect_invalid_params(err: Error, needle: &str) {
        match err {
            Error::Rpc(err) => {
                assert_eq!(err.code, crate::errors::error_codes::INVALID_PARAMS);
                assert!(err.message.contains(needle), "unexpected message: {}", err.message);
            }
            other => panic!("expected an invalid-params error, got: {other}"),
        }
    }

    #[test]
    fn zero_arity_accepts_absent_null_and_empty() {
        assert!(<()>::decode(None).is_ok());
        assert!(<()>::decode(Some(Value::Null)).is_ok());
        assert!(<()>::decode(Some(json!([]))).is_ok());
    }

    #[test]
    fn zero_arity_rejects_extra_arguments() {
        let err = <()>::decode(Some(json!([111]))).unwrap_err();
        expect_invalid_params(err, "Wrong number of arguments, expected: 0, got: 1");
    }

    #[test]
    fn positional_decode_reports_element_index() {
        let err = <(String, i64)>::decode(Some(json!([555444, 1]))).unwrap_err();
        expect_invalid_params(err, "Unable to decode parameter 0");
    }

    #[test]
    fn non_array_params_rejected_for_positional_methods() {
        let err = <(String,)>::decode(Some(json!(444))).unwrap_err();
        expect_invalid_params(err, "Params must be an array");
    }

    #[test]
    fn object_shorthand_decodes_single_record() {
        let (record,) = <(Record,)>::decode(Some(json!({"number": 1979, "name": "Jerome"})))
            .unwrap();
        assert_eq!(record, Record { number: 1979, name: "Jerome".to_string() });
    }

    #[test]
    fn object_shorthand_rejects_mismatched_object() {
        let err = <(Record,)>::decode(Some(json!({"number": "not a number"}))).unwrap_err();
        expect_invalid_params(err, "Params must be an object");
    }

    #[test]
    fn single_record_still_decodes_from_array() {
        let (record,) =
            <(Record,)>::decode(Some(json!([{"number": 7, "name": "x"}]))).unwrap();
        assert_eq!(record.number, 7);
    }

    #[test]
    fn optional_argument_decodes_null() {
        let (value,) = <(Option<i64>,)>::decode(Some(json!([null]))).unwrap();
        assert_eq!(value, None);
    }

    #[tokio::test]
    async fn call_descriptor_invokes_and_encodes() {
        let def = MethodDef::call("ApiAdd", |(a, b): (i64, i64)| async move { Ok(a + b) });
        assert_eq!(def.outputs, vec![OutputKind::Value, OutputKind::Error]);
        let method = ServiceMethod::from_def("Add".to_string(), &def).unwrap();
        assert!(!method.is_event());
        let value = method.invoke(Some(json!([2, 3]))).await.unwrap();
        assert_eq!(value, json!(5));
    }

    #[tokio::test]
    async fn event_descriptor_yields_null() {
        let def = MethodDef::event("ApiPing", |_: ()| async {});
        assert!(def.outputs.is_empty());
        let method = ServiceMethod::from_def("Ping".to_string(), &def).unwrap();
        assert!(method.is_event());
        assert_eq!(method.invoke(None).await.unwrap(), Value::Null);
    }

    #[test]
    fn foreign_output_signatures_are_rejected() {
        let def = MethodDef::call("ApiManyOutputs", |(n,): (i64,)| async move { Ok(n) })
            .with_outputs(vec![OutputKind::Value, OutputKind::Value, OutputKind::Error]);
        let err = ServiceMethod::from_def("ManyOutputs".to_string(), &def).unwrap_err();
        assert!(err
            .to_string()
            .contains("Method 'ApiManyOutputs' must have 0 or 2 outputs, found: 3"));
    }

    #[test]
    fn short_type_name_strips_module_path() {
        assert_eq!(short_type_name("crate::module::Thing"), "Thing");
        assert_eq!(short_type_name("Thing"), "Thing");
    }
}
