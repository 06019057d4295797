//! Dispatcher: routes (controller, action) pairs to pooled controller instances.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use hookwire_protocol::{HandlerError, HandlerResult, Request, Response};
use hookwire_session::{MemorySessionStore, SharedSessionStore};
use hookwire_transport::RequestHandler;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::DispatcherConfig;
use crate::controller::{Controller, SessionSource};
use crate::error::{ActionFault, DispatchError, RegistryError};
use crate::instance::{ControllerInstance, DispatchEnv};
use crate::middleware::MiddlewareResolver;
use crate::registry::{ActionRegistry, ControllerType};

/// Idle instances of one controller type.
struct ControllerPool<C: Controller> {
    ty: Arc<ControllerType<C>>,
    idle: Mutex<Vec<ControllerInstance<C>>>,
    capacity: usize,
}

impl<C: Controller> ControllerPool<C> {
    fn new(ty: Arc<ControllerType<C>>, capacity: usize) -> Self {
        Self {
            ty,
            idle: Mutex::new(Vec::new()),
            capacity,
        }
    }

    fn acquire(&self) -> ControllerInstance<C> {
        self.idle
            .lock()
            .pop()
            .unwrap_or_else(|| ControllerInstance::new(self.ty.clone()))
    }

    fn release(&self, instance: ControllerInstance<C>) {
        let mut idle = self.idle.lock();
        if idle.len() < self.capacity {
            idle.push(instance);
        }
    }

    async fn dispatch(
        &self,
        action: &str,
        request: Request,
        response: Response,
        env: &DispatchEnv<'_>,
    ) -> Result<Option<String>, ActionFault> {
        let mut instance = self.acquire();
        let result = instance.hook(action, request, response, env).await;
        // hook() always finishes cleanup before returning, faults included.
        // A dispatch future dropped mid-way drops its instance instead.
        self.release(instance);
        result
    }
}

/// Object-safe wrapper for a typed pool.
trait RouteDyn: Send + Sync {
    fn type_name_dyn(&self) -> &str;
    fn idle_dyn(&self) -> usize;
    fn dispatch_dyn<'a>(
        &'a self,
        action: &'a str,
        request: Request,
        response: Response,
        env: &'a DispatchEnv<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, ActionFault>> + Send + 'a>>;
}

impl<C: Controller> RouteDyn for ControllerPool<C> {
    fn type_name_dyn(&self) -> &str {
        self.ty.name()
    }

    fn idle_dyn(&self) -> usize {
        self.idle.lock().len()
    }

    fn dispatch_dyn<'a>(
        &'a self,
        action: &'a str,
        request: Request,
        response: Response,
        env: &'a DispatchEnv<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<Option<String>, ActionFault>> + Send + 'a>> {
        Box::pin(self.dispatch(action, request, response, env))
    }
}

/// Owns the registry, the middleware resolver, the session
/// store and one instance pool per registered controller.
pub struct Dispatcher {
    config: DispatcherConfig,
    registry: ActionRegistry,
    resolver: MiddlewareResolver,
    sessions: SessionSource,
    routes: HashMap<String, Arc<dyn RouteDyn>>,
}

impl Dispatcher {
    pub fn new(config: DispatcherConfig, resolver: MiddlewareResolver, store: SharedSessionStore) -> Self {
        let sessions = SessionSource {
            store,
            config: Arc::new(config.session.clone()),
        };
        Self {
            config,
            registry: ActionRegistry::new(),
            resolver,
            sessions,
            routes: HashMap::new(),
        }
    }

    /// Dispatcher backed by a fresh [`MemorySessionStore`].
    pub fn with_memory_store(config: DispatcherConfig, resolver: MiddlewareResolver) -> Self {
        let store = MemorySessionStore::with_idle_timeout(config.session.idle_timeout);
        Self::new(config, resolver, Arc::new(store))
    }

    /// Register a controller type. `prototype` becomes the default snapshot
    /// every instance of `C` is restored to.
    pub fn register<C: Controller>(&mut self, prototype: C) -> Result<(), RegistryError> {
        let ty = self.registry.get_or_build(|| prototype, &self.resolver)?;
        let name = ty.name().to_string();
        if self.routes.contains_key(&name) {
            return Err(RegistryError::DuplicateController(name));
        }

        info!("Registering controller: {name}");
        self.routes
            .insert(name, Arc::new(ControllerPool::new(ty, self.config.pool_capacity)));
        Ok(())
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Registered controller names, sorted.
    pub fn controllers(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.values().map(|r| r.type_name_dyn()).collect();
        names.sort_unstable();
        names
    }

    /// Idle pooled instances for `controller`.
    pub fn idle_instances(&self, controller: &str) -> usize {
        self.routes.get(controller).map(|r| r.idle_dyn()).unwrap_or(0)
    }

    /// Run one dispatch. `Ok(Some(path))` asks the caller to re-route to `path`.
    pub async fn dispatch(
        &self,
        controller: &str,
        action: &str,
        request: Request,
        response: Response,
    ) -> Result<Option<String>, DispatchError> {
        let route = self
            .routes
            .get(controller)
            .ok_or_else(|| DispatchError::ControllerNotFound(controller.to_string()))?;

        debug!("Dispatching {controller}::{action} ({} {})", request.method(), request.path());
        let env = self.env();
        Ok(route.dispatch_dyn(action, request, response, &env).await?)
    }

    /// Instance of a registered type outside the pool.
    pub fn new_instance<C: Controller>(&self) -> Option<ControllerInstance<C>> {
        self.registry.get::<C>().map(ControllerInstance::new)
    }

    /// Drive a caller-held instance through one dispatch.
    pub async fn dispatch_instance<C: Controller>(
        &self,
        instance: &mut ControllerInstance<C>,
        action: &str,
        request: Request,
        response: Response,
    ) -> Result<Option<String>, ActionFault> {
        let env = self.env();
        instance.hook(action, request, response, &env).await
    }

    fn env(&self) -> DispatchEnv<'_> {
        DispatchEnv {
            csrf_key: &self.config.csrf_key,
            resolver: &self.resolver,
            sessions: &self.sessions,
        }
    }
}

impl RequestHandler for Dispatcher {
    async fn handle_request(
        &self,
        controller: &str,
        action: &str,
        request: Request,
        response: Response,
    ) -> HandlerResult {
        self.dispatch(controller, action, request, response)
            .await
            .map_err(HandlerError::from)
    }

    fn controllers(&self) -> Vec<String> {
        Dispatcher::controllers(self).into_iter().map(str::to_string).collect()
    }
}
