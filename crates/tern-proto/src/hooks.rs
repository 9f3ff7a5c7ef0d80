use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Ordered, type-keyed registry of extension hook providers.
///
/// Each hook type (a trait object such as `dyn MailHook`) maps to the list
/// of providers registered for it, in registration order. Command handlers
/// pull their list during the one-shot wiring pass and hold it for the life
/// of the chain, so lookups after wiring never touch the registry.
#[derive(Default)]
pub struct HookRegistry {
    providers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider for hook type `H`.
    pub fn add<H: ?Sized + Send + Sync + 'static>(&mut self, hook: Arc<H>) {
        self.providers
            .entry(TypeId::of::<H>())
            .or_insert_with(|| Box::new(Vec::<Arc<H>>::new()))
            .downcast_mut::<Vec<Arc<H>>>()
            .expect("registry slot holds the vector for its own type id")
            .push(hook);
    }

    /// The providers registered for hook type `H`, in registration order.
    pub fn get<H: ?Sized + Send + Sync + 'static>(&self) -> Vec<Arc<H>> {
        self.providers
            .get(&TypeId::of::<H>())
            .and_then(|slot| slot.downcast_ref::<Vec<Arc<H>>>())
            .cloned()
            .unwrap_or_default()
    }
}
