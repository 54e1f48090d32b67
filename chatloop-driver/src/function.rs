//! Local functions the model may call
//!
//! A `CallableFunction` pairs the declaration advertised to the model with the
//! code that runs when the model asks for it. `FunctionRegistry` is a plain
//! ordered list; lookup is linear and the first registration with a matching
//! name wins.

use async_trait::async_trait;
use chatloop_client::FunctionDeclaration;
use chatloop_error::{Error, ErrorKind, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

/// Code executed when the model requests a function
#[async_trait]
pub trait Callable: Send + Sync {
    /// Run with the arguments the model supplied, already parsed as JSON
    async fn call(&self, arguments: Value) -> Result<String>;
}

/// A callable over untyped JSON arguments
pub struct FnCallable<F> {
    f: F,
}

impl<F> FnCallable<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Callable for FnCallable<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    async fn call(&self, arguments: Value) -> Result<String> {
        (self.f)(arguments).await
    }
}

/// A callable that declares its own parameter type.
///
/// Arguments are deserialized into `P` before the closure runs; a mismatch is
/// reported as a `SerializationFailed` error, which the driver turns into the
/// same placeholder result as any other function failure.
pub struct TypedFunction<P, F> {
    f: F,
    _params: PhantomData<fn(P)>,
}

impl<P, F> TypedFunction<P, F> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _params: PhantomData,
        }
    }
}

#[async_trait]
impl<P, F, Fut> Callable for TypedFunction<P, F>
where
    P: DeserializeOwned + Send + 'static,
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<String>> + Send + 'static,
{
    async fn call(&self, arguments: Value) -> Result<String> {
        let params = serde_json::from_value::<P>(arguments).map_err(|e| {
            Error::new(ErrorKind::SerializationFailed, e.to_string())
                .with_operation("typed_function::call")
                .with_context("params", std::any::type_name::<P>())
                .set_source(e)
        })?;
        (self.f)(params).await
    }
}

/// A declaration bound to the code that implements it
#[derive(Clone)]
pub struct CallableFunction {
    declaration: FunctionDeclaration,
    callable: Arc<dyn Callable>,
}

impl CallableFunction {
    pub fn new(declaration: FunctionDeclaration, callable: impl Callable + 'static) -> Self {
        Self {
            declaration,
            callable: Arc::new(callable),
        }
    }

    pub fn name(&self) -> &str {
        &self.declaration.name
    }

    pub fn declaration(&self) -> &FunctionDeclaration {
        &self.declaration
    }

    pub async fn call(&self, arguments: Value) -> Result<String> {
        self.callable.call(arguments).await
    }
}

impl std::fmt::Debug for CallableFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallableFunction")
            .field("name", &self.declaration.name)
            .finish_non_exhaustive()
    }
}

/// Ordered set of functions exposed to the model
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: Vec<CallableFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a registration. Names are not checked for uniqueness.
    pub fn register(mut self, function: CallableFunction) -> Self {
        self.functions.push(function);
        self
    }

    /// Register a closure over untyped JSON arguments
    pub fn register_fn<F, Fut>(self, declaration: FunctionDeclaration, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.register(CallableFunction::new(declaration, FnCallable::new(f)))
    }

    /// Register a closure whose arguments are deserialized into `P` first
    pub fn register_typed<P, F, Fut>(self, declaration: FunctionDeclaration, f: F) -> Self
    where
        P: DeserializeOwned + Send + 'static,
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<String>> + Send + 'static,
    {
        self.register(CallableFunction::new(declaration, TypedFunction::new(f)))
    }

    /// First registration named `name`
    pub fn find(&self, name: &str) -> Option<&CallableFunction> {
        self.functions.iter().find(|f| f.name() == name)
    }

    /// Declarations in registration order, as advertised to the model
    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.functions.iter().map(|f| f.declaration.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct SeedParams {
        seed: f64,
    }

    fn decl(name: &str) -> FunctionDeclaration {
        FunctionDeclaration::new(name, format!("{} description", name))
    }

    #[tokio::test]
    async fn test_first_registration_wins() {
        let registry = FunctionRegistry::new()
            .register_fn(decl("echo"), |_| async { Ok("first".to_string()) })
            .register_fn(decl("echo"), |_| async { Ok("second".to_string()) });

        assert_eq!(registry.len(), 2);
        let found = registry.find("echo").unwrap();
        assert_eq!(found.call(Value::Null).await.unwrap(), "first");
        assert!(registry.find("missing").is_none());
    }

    #[tokio::test]
    async fn test_typed_function_deserializes() {
        let registry =
            FunctionRegistry::new().register_typed(decl("get_news"), |p: SeedParams| async move {
                Ok(if p.seed < 50.0 { "sunny" } else { "rainy" }.to_string())
            });

        let f = registry.find("get_news").unwrap();
        assert_eq!(f.call(serde_json::json!({ "seed": 10 })).await.unwrap(), "sunny");
        assert_eq!(f.call(serde_json::json!({ "seed": 75 })).await.unwrap(), "rainy");
    }

    #[tokio::test]
    async fn test_typed_function_rejects_mismatched_arguments() {
        let f = CallableFunction::new(
            decl("get_news"),
            TypedFunction::<SeedParams, _>::new(|_: SeedParams| async { Ok(String::new()) }),
        );

        let err = f.call(serde_json::json!({ "seed": "ten" })).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SerializationFailed);
    }

    #[test]
    fn test_declarations_keep_order() {
        let registry = FunctionRegistry::new()
            .register_fn(decl("b"), |_| async { Ok(String::new()) })
            .register_fn(decl("a"), |_| async { Ok(String::new()) });

        let names: Vec<_> = registry.declarations().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["b", "a"]);
        assert!(!registry.is_empty());
    }
}
