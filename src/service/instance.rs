//! Live service objects and their lifecycle hooks.

use std::any::{type_name, Any};
use std::fmt;
use std::sync::Arc;

use crate::plugin::PluginRegistry;

/// Lifecycle hooks for services that need more than construction.
///
/// The container calls [`initialize`](Service::initialize) right after the
/// factory returns, then [`register_notifications`](Service::register_notifications),
/// and only then publishes the instance. [`dispose`](Service::dispose) runs when
/// the owning container is disposed.
pub trait Service: Any + Send + Sync {
    /// Post-construction initialization. An error marks the plugin as invalid.
    fn initialize(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Subscribe to notifications. Never runs before `initialize` succeeded.
    fn register_notifications(&self, _registry: &PluginRegistry) {}

    /// Release resources when the container goes away.
    fn dispose(&self) {}
}

/// Type-erased live object produced by a factory.
///
/// Either a plain value, or a value that also carries [`Service`] hooks. Both
/// views point at the same allocation.
#[derive(Clone)]
pub struct Instance {
    value: Arc<dyn Any + Send + Sync>,
    lifecycle: Option<Arc<dyn Service>>,
    type_name: &'static str,
}

impl Instance {
    /// Wrap a value that has no lifecycle hooks.
    pub fn plain<T: Any + Send + Sync>(value: T) -> Self {
        Self::from_arc(Arc::new(value))
    }

    /// Wrap a shared value that has no lifecycle hooks.
    pub fn from_arc<T: Any + Send + Sync>(value: Arc<T>) -> Self {
        Self { value, lifecycle: None, type_name: type_name::<T>() }
    }

    /// Wrap a value whose [`Service`] hooks the container must run.
    pub fn service<T: Service>(value: T) -> Self {
        let value = Arc::new(value);
        Self {
            value: Arc::clone(&value) as Arc<dyn Any + Send + Sync>,
            lifecycle: Some(value as Arc<dyn Service>),
            type_name: type_name::<T>(),
        }
    }

    /// Shared handle to the concrete value, if it is a `T`.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.value).downcast::<T>().ok()
    }

    /// Borrow the concrete value, if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Whether both handles point at the same object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }

    /// Lifecycle hooks, when the value was wrapped with [`Instance::service`].
    pub fn lifecycle(&self) -> Option<&Arc<dyn Service>> {
        self.lifecycle.as_ref()
    }

    /// Rust type name of the wrapped value.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("type", &self.type_name)
            .field("lifecycle", &self.lifecycle.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    struct Counter(u32);

    #[derive(Default)]
    struct Hooked {
        initialized: AtomicBool,
    }

    impl Service for Hooked {
        fn initialize(&self) -> anyhow::Result<()> {
            self.initialized.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_plain_downcast() {
        let instance = Instance::plain(Counter(7));

        assert!(instance.is::<Counter>());
        assert_eq!(instance.downcast_ref::<Counter>().unwrap().0, 7);
        assert_eq!(instance.downcast::<Counter>().unwrap().0, 7);
        assert!(instance.downcast::<String>().is_none());
        assert!(instance.lifecycle().is_none());
    }

    #[test]
    fn test_service_views_share_allocation() {
        let instance = Instance::service(Hooked::default());

        instance.lifecycle().unwrap().initialize().unwrap();
        assert!(instance.downcast_ref::<Hooked>().unwrap().initialized.load(Ordering::SeqCst));
    }

    #[test]
    fn test_ptr_eq() {
        let a = Instance::plain(Counter(1));
        let b = a.clone();
        let c = Instance::plain(Counter(1));

        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert!(a.type_name().ends_with("Counter"));
    }
}
