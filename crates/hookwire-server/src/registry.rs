//! ActionRegistry: per-type action sets and default snapshots, built once.

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use hookwire_protocol::QualifiedAction;
use parking_lot::RwLock;
use tracing::{info, warn};

use crate::controller::{Controller, INDEX_ACTION, is_reserved_action};
use crate::error::RegistryError;
use crate::middleware::MiddlewareResolver;

/// Everything the dispatcher needs to know about one controller type.
#[derive(Debug)]
pub struct ControllerType<C> {
    name: String,
    allowed_actions: HashSet<String>,
    middleware: Vec<String>,
    middleware_except: Vec<String>,
    defaults: C,
}

impl<C: Controller> ControllerType<C> {
    /// Validate `C`'s manifest and capture `prototype` as the default snapshot.
    pub fn build(prototype: C, resolver: &MiddlewareResolver) -> Result<Self, RegistryError> {
        let manifest = C::manifest();
        let name = manifest.type_name().to_string();

        if name.is_empty() {
            return Err(RegistryError::EmptyTypeName);
        }
        if !is_identifier(&name) {
            return Err(RegistryError::InvalidTypeName(name));
        }

        let mut allowed_actions = HashSet::new();
        let mut seen = HashSet::new();
        for action in manifest.declared_actions() {
            if !is_identifier(action) {
                return Err(RegistryError::InvalidActionName {
                    type_name: name,
                    action: action.clone(),
                });
            }
            if !seen.insert(action.as_str()) {
                return Err(RegistryError::DuplicateAction {
                    type_name: name,
                    action: action.clone(),
                });
            }
            if is_reserved_action(action) {
                warn!("{name}: `{action}` is a reserved name and will not be invokable");
                continue;
            }
            allowed_actions.insert(action.clone());
        }

        for id in manifest.middleware_ids() {
            if !resolver.contains(id) {
                return Err(RegistryError::UnknownMiddleware {
                    type_name: name,
                    middleware: id.clone(),
                });
            }
        }

        if !allowed_actions.contains(INDEX_ACTION) {
            warn!("{name}: no `{INDEX_ACTION}` action, `/{name}` will answer not-found");
        }

        Ok(Self {
            name,
            allowed_actions,
            middleware: manifest.middleware_ids().to_vec(),
            middleware_except: manifest.middleware_except().to_vec(),
            defaults: prototype,
        })
    }
}

impl<C> ControllerType<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a bare `/Type` path has an action to land on.
    pub fn has_index(&self) -> bool {
        self.allowed_actions.contains(INDEX_ACTION)
    }

    /// Whether `action` may be invoked externally.
    pub fn allows(&self, action: &str) -> bool {
        self.allowed_actions.contains(action)
    }

    /// Allowed action names, sorted.
    pub fn allowed_actions(&self) -> Vec<&str> {
        let mut actions: Vec<&str> = self.allowed_actions.iter().map(String::as_str).collect();
        actions.sort_unstable();
        actions
    }

    /// Middleware identifiers in chain order.
    pub fn middleware(&self) -> &[String] {
        &self.middleware
    }

    /// Qualified actions that bypass the whole chain.
    pub fn middleware_except(&self) -> &[String] {
        &self.middleware_except
    }

    /// The snapshot every instance is restored to after a dispatch.
    pub fn defaults(&self) -> &C {
        &self.defaults
    }

    pub fn qualify(&self, action: &str) -> QualifiedAction {
        QualifiedAction::new(&self.name, action)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Cache of [`ControllerType`]s keyed by concrete Rust type.
///
/// Reads take a shared lock; a miss takes the write lock and re-checks before
/// building, so concurrent first use still builds each type exactly once.
#[derive(Default)]
pub struct ActionRegistry {
    types: RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
    builds: AtomicUsize,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The cached type for `C`, if it has been built.
    pub fn get<C: Controller>(&self) -> Option<Arc<ControllerType<C>>> {
        let entry = self.types.read().get(&TypeId::of::<C>()).cloned()?;
        entry.downcast::<ControllerType<C>>().ok()
    }

    /// Return the cached type for `C`, building it from `prototype` on first use.
    ///
    /// `prototype` is only called when a build actually happens.
    pub fn get_or_build<C, F>(
        &self,
        prototype: F,
        resolver: &MiddlewareResolver,
    ) -> Result<Arc<ControllerType<C>>, RegistryError>
    where
        C: Controller,
        F: FnOnce() -> C,
    {
        if let Some(ty) = self.get::<C>() {
            return Ok(ty);
        }

        let mut types = self.types.write();
        if let Some(entry) = types.get(&TypeId::of::<C>()) {
            if let Ok(ty) = entry.clone().downcast::<ControllerType<C>>() {
                return Ok(ty);
            }
        }

        let ty = Arc::new(ControllerType::build(prototype(), resolver)?);
        types.insert(TypeId::of::<C>(), ty.clone());
        self.builds.fetch_add(1, Ordering::Relaxed);
        info!(
            "Controller type built: {} (actions: {:?}, middleware: {:?})",
            ty.name(),
            ty.allowed_actions(),
            ty.middleware()
        );
        Ok(ty)
    }

    /// Number of builds performed so far.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.types.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.read().is_empty()
    }
}
