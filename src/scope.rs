//! Scopes and the scope stack.
//!
//! A [`Scope`] holds explicitly registered resources and points to a parent
//! scope. Lookups that miss in a scope continue in its parent. Scopes are
//! activated by pushing them onto the scope stack for the dynamic extent of
//! a unit of work; the top of the stack is the current scope, which is where
//! [`ResourceType::create`] registers new resources.
//!
//! The stack is task-local: every tokio task (or thread, outside a runtime)
//! has its own, so concurrent work never observes another context's pushed
//! scopes. When nothing has been pushed the stack holds only the global
//! scope.
//!
//! # Example
//!
//! ```rust
//! use rustadmin::{Attributes, ResourceType, Scope};
//!
//! let host = ResourceType::declare("DocScopeHost", None);
//!
//! Scope::enter(|scope| {
//!     let db = host.create("db1", Attributes::new())?;
//!     assert_eq!(scope.find(&host, "db1")?, Some(db));
//!     Ok::<_, rustadmin::ResourceError>(())
//! })
//! .unwrap();
//!
//! // The scope is gone again once `enter` returns.
//! assert_eq!(host.find("db1").unwrap(), None);
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::error::{ResourceError, ResourceResult};
use crate::pattern::PatternMatch;
use crate::resource::Resource;
use crate::resource_type::ResourceType;

tokio::task_local! {
    static SCOPE_STACK: ScopeStack;
}

static NEXT_SCOPE_ID: AtomicU64 = AtomicU64::new(0);

struct ScopeInner {
    id: u64,
    parent: Option<Scope>,
    // type id -> resource name -> resource
    resources: RwLock<BTreeMap<u64, BTreeMap<String, Resource>>>,
}

/// A container of named resources with a parent for lookup fallthrough.
///
/// Cloning is cheap; clones refer to the same scope and compare equal.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Create a scope whose parent is the current scope at this moment.
    pub fn new() -> Scope {
        Scope::with_parent(Some(&current_scope()))
    }

    /// Create a scope without a parent.
    pub fn root() -> Scope {
        Scope::with_parent(None)
    }

    /// Create a scope with an explicit parent.
    pub fn with_parent(parent: Option<&Scope>) -> Scope {
        Scope {
            inner: Arc::new(ScopeInner {
                id: NEXT_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
                parent: parent.cloned(),
                resources: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    /// The implicitly created global scope at the bottom of every stack.
    pub fn global() -> Scope {
        static GLOBAL: OnceLock<Scope> = OnceLock::new();
        GLOBAL.get_or_init(Scope::root).clone()
    }

    /// The scope on top of the current scope stack.
    pub fn current() -> Scope {
        current_scope()
    }

    /// Evaluate `f` in a new child of the current scope.
    pub fn enter<R>(f: impl FnOnce(&Scope) -> R) -> R {
        Scope::new().eval(f)
    }

    /// Evaluate `f` with this scope pushed onto the scope stack.
    pub fn eval<R>(&self, f: impl FnOnce(&Scope) -> R) -> R {
        scope_eval(self, f)
    }

    /// Evaluate the future returned by `f` with this scope pushed onto the
    /// scope stack.
    pub async fn eval_async<F, Fut, R>(&self, f: F) -> R
    where
        F: FnOnce(Scope) -> Fut,
        Fut: Future<Output = R>,
    {
        scope_eval_async(self, f).await
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn parent(&self) -> Option<&Scope> {
        self.inner.parent.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.inner.parent.is_none()
    }

    /// Register a resource under `name` and the resource's own type.
    ///
    /// Only this scope is checked for duplicates; a parent may hold a
    /// resource of the same type and name, which this one then shadows.
    pub fn add_resource(&self, name: impl AsRef<str>, resource: &Resource) -> ResourceResult<()> {
        let name = name.as_ref();
        let resource_type = resource.resource_type();
        let type_name = resource_type.name();

        let mut resources = self.inner.resources.write();
        let named = resources.entry(resource_type.id()).or_default();
        if named.contains_key(name) {
            return Err(ResourceError::DuplicateResource {
                type_name: type_name.to_string(),
                name: name.to_string(),
                scope: self.to_string(),
            });
        }
        named.insert(name.to_string(), resource.clone());
        drop(resources);

        debug!(scope = self.inner.id, resource_type = %type_name, name = %name, "Registered resource");
        Ok(())
    }

    /// Declare a pattern rule for `ty`.
    ///
    /// Pattern rules are owned by the resource type, so the rule applies to
    /// lookups in every scope, not only this one.
    pub fn add_pattern<F>(&self, ty: &ResourceType, pattern: &str, priority: i32, generator: F) -> ResourceResult<()>
    where
        F: Fn(&ResourceType, &PatternMatch) -> ResourceResult<Resource> + Send + Sync + 'static,
    {
        ty.add_pattern_rule(pattern, priority, Arc::new(generator))
    }

    /// All resources registered directly in this scope.
    pub fn resources(&self) -> Vec<Resource> {
        self.inner
            .resources
            .read()
            .values()
            .flat_map(|named| named.values().cloned())
            .collect()
    }

    /// Explicit registration of `(ty, name)` in this scope only. Neither
    /// ancestor types nor parent scopes are consulted.
    pub fn lookup(&self, ty: &ResourceType, name: &str) -> Option<Resource> {
        self.inner
            .resources
            .read()
            .get(&ty.id())
            .and_then(|named| named.get(name))
            .cloned()
    }

    /// Resolve `name` as a resource of type `ty` (or a subtype).
    ///
    /// For each scope from this one up to the root, every type from `ty` up
    /// to the root type is tried in turn for an explicit registration in
    /// that scope. Pattern rules belong to the types, which makes them part
    /// of the outermost scope: they are consulted only there, after that
    /// scope's registration for the same type. Resources built by pattern
    /// rules are returned without being registered.
    pub fn find(&self, ty: &ResourceType, name: impl AsRef<str>) -> ResourceResult<Option<Resource>> {
        let name = name.as_ref();
        let mut scope = Some(self.clone());

        while let Some(current) = scope {
            let parent = current.inner.parent.clone();
            if let Some(resource) = current.find_here(ty, name, parent.is_none())? {
                return Ok(Some(resource));
            }
            trace!(scope = current.inner.id, resource_type = %ty, name = %name, "Not found, trying parent");
            scope = parent;
        }

        Ok(None)
    }

    /// Like [`Scope::find`], but absence is a [`ResourceError::ResourceNotFound`].
    pub fn get(&self, ty: &ResourceType, name: impl AsRef<str>) -> ResourceResult<Resource> {
        let name = name.as_ref();
        self.find(ty, name)?
            .ok_or_else(|| ResourceError::ResourceNotFound {
                type_name: ty.name().to_string(),
                name: name.to_string(),
            })
    }

    fn find_here(&self, ty: &ResourceType, name: &str, with_patterns: bool) -> ResourceResult<Option<Resource>> {
        for acting in ty.ancestors() {
            if let Some(resource) = self.lookup(&acting, name) {
                trace!(scope = self.inner.id, resource_type = %acting, name = %name, "Found registered resource");
                return Ok(Some(resource));
            }
            if !with_patterns {
                continue;
            }

            // The rules are a snapshot and no lock is held while a
            // generator runs, so generators may register into this scope.
            for rule in acting.pattern_rules() {
                let Some(matched) = rule.matches(name) else {
                    continue;
                };

                let resource = rule.generate(&acting, &matched)?;
                if !resource.is_a(&acting) {
                    return Err(ResourceError::PatternResultTypeMismatch {
                        pattern: rule.pattern().to_string(),
                        expected: acting.name().to_string(),
                        actual: resource.to_string(),
                    });
                }

                debug!(
                    resource_type = %acting,
                    pattern = %rule.pattern(),
                    name = %name,
                    "Synthesized resource from pattern"
                );
                return Ok(Some(resource));
            }
        }

        Ok(None)
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Scope {}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<Scope {}>", self.inner.id)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.inner.id)
            .field("parent", &self.inner.parent.as_ref().map(|p| p.inner.id))
            .field("resources", &self.inner.resources.read().values().map(|n| n.len()).sum::<usize>())
            .finish()
    }
}

/// The ordered set of active scopes. The last scope is the current one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
}

impl ScopeStack {
    /// Snapshot of the stack for the current execution context.
    pub fn current() -> ScopeStack {
        SCOPE_STACK
            .try_with(|stack| stack.clone())
            .unwrap_or_else(|_| ScopeStack::base())
    }

    fn base() -> ScopeStack {
        ScopeStack {
            scopes: vec![Scope::global()],
        }
    }

    fn pushed(mut self, scope: Scope) -> ScopeStack {
        self.scopes.push(scope);
        self
    }

    /// The current scope.
    pub fn top(&self) -> &Scope {
        // Never empty: every stack starts from the global scope.
        &self.scopes[self.scopes.len() - 1]
    }

    pub fn scopes(&self) -> &[Scope] {
        &self.scopes
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }
}

/// The scope on top of the scope stack of the current execution context.
pub fn current_scope() -> Scope {
    SCOPE_STACK
        .try_with(|stack| stack.top().clone())
        .unwrap_or_else(|_| Scope::global())
}

/// The global scope.
pub fn global_scope() -> Scope {
    Scope::global()
}

/// Run `f` with `scope` pushed onto the scope stack.
///
/// The previous stack is restored when `f` returns, including when it
/// returns an error or panics.
pub fn scope_eval<R>(scope: &Scope, f: impl FnOnce(&Scope) -> R) -> R {
    let stack = ScopeStack::current().pushed(scope.clone());
    trace!(scope = scope.inner.id, depth = stack.len(), "Entering scope");
    SCOPE_STACK.sync_scope(stack, || f(scope))
}

/// Await the future returned by `f` with `scope` pushed onto the scope
/// stack of the awaiting task.
///
/// Tasks spawned from inside do not inherit the stack.
pub async fn scope_eval_async<F, Fut, R>(scope: &Scope, f: F) -> R
where
    F: FnOnce(Scope) -> Fut,
    Fut: Future<Output = R>,
{
    let stack = ScopeStack::current().pushed(scope.clone());
    let scope = scope.clone();
    SCOPE_STACK.scope(stack, async move { f(scope).await }).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Attributes;

    #[test]
    fn test_global_scope_is_base_of_stack() {
        let stack = ScopeStack::current();
        assert_eq!(stack.len(), 1);
        assert_eq!(stack.top(), &Scope::global());
        assert!(Scope::global().is_root());
    }

    #[test]
    fn test_scope_eval_pushes_and_pops() {
        let original = ScopeStack::current();
        let scope = Scope::new();
        let mut evaluated = false;

        scope.eval(|s| {
            evaluated = true;
            assert_eq!(&current_scope(), s);
            let stack = ScopeStack::current();
            assert_eq!(&stack.scopes()[..stack.len() - 1], original.scopes());
        });

        assert!(evaluated);
        assert_eq!(ScopeStack::current(), original);
    }

    #[test]
    fn test_new_scope_parent_is_snapshot_of_current() {
        let outer = Scope::root();
        let inner = outer.eval(|_| Scope::new());

        assert_eq!(inner.parent(), Some(&outer));
        // Creating the child did not push it.
        assert_eq!(outer.eval(|_| current_scope()), outer);
    }

    #[test]
    fn test_nested_eval() {
        let a = Scope::root();
        let b = Scope::root();

        a.eval(|_| {
            b.eval(|_| {
                assert_eq!(ScopeStack::current().len(), 3);
                assert_eq!(current_scope(), b);
            });
            assert_eq!(current_scope(), a);
        });
    }

    #[test]
    fn test_eval_restores_after_panic() {
        let original = ScopeStack::current();
        let scope = Scope::root();

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            scope.eval(|_| panic!("boom"));
        }));

        assert!(result.is_err());
        assert_eq!(ScopeStack::current(), original);
    }

    #[test]
    fn test_duplicate_in_same_scope() {
        let ty = ResourceType::declare("ScopeTestDup", None);
        let scope = Scope::root();
        let a = ty.new_resource("x", Attributes::new()).unwrap();
        let b = ty.new_resource("x", Attributes::new()).unwrap();

        scope.add_resource("x", &a).unwrap();
        let err = scope.add_resource("x", &b).unwrap_err();
        assert!(matches!(err, ResourceError::DuplicateResource { .. }));
        assert_eq!(scope.resources(), vec![a]);
    }

    #[test]
    fn test_lookup_is_local() {
        let ty = ResourceType::declare("ScopeTestLocal", None);
        let parent = Scope::root();
        let child = Scope::with_parent(Some(&parent));
        let r = ty.new_resource("x", Attributes::new()).unwrap();
        parent.add_resource("x", &r).unwrap();

        assert!(child.lookup(&ty, "x").is_none());
        assert_eq!(child.find(&ty, "x").unwrap(), Some(r));
    }

    #[test]
    fn test_parent_registration_beats_pattern() {
        let ty = ResourceType::declare("ScopeTestParentWins", None);
        ty.define_pattern(".*", |ty, m| ty.new_resource(&m.name, Attributes::new()))
            .unwrap();

        let parent = Scope::root();
        let child = Scope::with_parent(Some(&parent));
        let grandchild = Scope::with_parent(Some(&child));
        let registered = ty.new_resource("test", Attributes::new()).unwrap();
        parent.add_resource("test", &registered).unwrap();

        assert_eq!(child.find(&ty, "test").unwrap(), Some(registered.clone()));
        assert_eq!(grandchild.find(&ty, "test").unwrap(), Some(registered.clone()));

        // Names without a registration still reach the pattern.
        let synthesized = grandchild.find(&ty, "other").unwrap().unwrap();
        assert_ne!(synthesized, registered);
        assert_eq!(synthesized.name(), "other");
    }

    #[test]
    fn test_same_name_types_do_not_share_slots() {
        let first = ResourceType::declare("ScopeTestTwice", None);
        let second = ResourceType::declare("ScopeTestTwice", None);
        let scope = Scope::root();

        let a = first.new_resource("x", Attributes::new()).unwrap();
        let b = second.new_resource("x", Attributes::new()).unwrap();
        scope.add_resource("x", &a).unwrap();
        scope.add_resource("x", &b).unwrap();

        assert_eq!(scope.lookup(&first, "x"), Some(a));
        assert_eq!(scope.lookup(&second, "x"), Some(b));
    }

    #[test]
    fn test_add_pattern_delegates_to_type() {
        let ty = ResourceType::declare("ScopeTestPattern", None);
        let scope = Scope::root();
        scope
            .add_pattern(&ty, "p-.*", 3, |ty, m| ty.new_resource(&m.name, Attributes::new()))
            .unwrap();

        assert_eq!(ty.pattern_rules().len(), 1);
        assert_eq!(ty.pattern_rules()[0].priority(), 3);
        assert!(Scope::root().find(&ty, "p-1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_async_eval_isolated_between_futures() {
        let a = Scope::root();
        let b = Scope::root();

        let (seen_a, seen_b) = futures::future::join(
            a.eval_async(|_| async {
                tokio::task::yield_now().await;
                current_scope()
            }),
            b.eval_async(|_| async {
                tokio::task::yield_now().await;
                current_scope()
            }),
        )
        .await;

        assert_eq!(seen_a, a);
        assert_eq!(seen_b, b);
        assert_eq!(current_scope(), Scope::global());
    }

    #[tokio::test]
    async fn test_spawned_task_does_not_inherit_stack() {
        let scope = Scope::root();
        let seen = scope
            .eval_async(|_| async {
                tokio::spawn(async { current_scope() }).await.unwrap()
            })
            .await;

        assert_eq!(seen, Scope::global());
    }
}
