//! Plugin registry: maps class names to constructors.

use std::collections::HashMap;
use std::sync::Arc;

use super::channel::{
    ChannelDestination, ChannelHub, ChannelSource, CHANNEL_DESTINATION, CHANNEL_SOURCE,
};
use super::error::PluginError;
use super::traits::{
    AppDestination, AppSource, DestinationConstructor, PluginContext, SourceConstructor,
};
use crate::streaming::{WebRtcDestination, WEBRTC_DESTINATION};

struct Registration<C> {
    /// Engine types the plugin supports. Empty means any.
    engines: Vec<String>,
    constructor: C,
}

impl<C> Registration<C> {
    fn supports(&self, engine_type: &str) -> bool {
        self.engines.is_empty() || self.engines.iter().any(|e| e == engine_type)
    }
}

/// Resolves source and destination classes named by requests.
pub struct PluginRegistry {
    sources: HashMap<String, Registration<SourceConstructor>>,
    destinations: HashMap<String, Registration<DestinationConstructor>>,
    hub: Arc<ChannelHub>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            sources: HashMap::new(),
            destinations: HashMap::new(),
            hub: Arc::new(ChannelHub::new()),
        }
    }

    /// Creates a registry holding the built-in plugins.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_source(CHANNEL_SOURCE, Vec::<String>::new(), ChannelSource::construct);
        registry.register_destination(
            CHANNEL_DESTINATION,
            Vec::<String>::new(),
            ChannelDestination::construct,
        );
        registry.register_destination(
            WEBRTC_DESTINATION,
            Vec::<String>::new(),
            WebRtcDestination::construct,
        );
        registry
    }

    pub fn register_source<F>(
        &mut self,
        class: impl Into<String>,
        engines: impl IntoIterator<Item = impl Into<String>>,
        constructor: F,
    ) where
        F: Fn(&PluginContext<'_>) -> Result<Arc<dyn AppSource>, PluginError> + Send + Sync + 'static,
    {
        self.sources.insert(
            class.into(),
            Registration {
                engines: engines.into_iter().map(Into::into).collect(),
                constructor: Arc::new(constructor),
            },
        );
    }

    pub fn register_destination<F>(
        &mut self,
        class: impl Into<String>,
        engines: impl IntoIterator<Item = impl Into<String>>,
        constructor: F,
    ) where
        F: Fn(&PluginContext<'_>) -> Result<Arc<dyn AppDestination>, PluginError>
            + Send
            + Sync
            + 'static,
    {
        self.destinations.insert(
            class.into(),
            Registration {
                engines: engines.into_iter().map(Into::into).collect(),
                constructor: Arc::new(constructor),
            },
        );
    }

    /// Channel hub shared by the built-in channel plugins.
    pub fn hub(&self) -> &Arc<ChannelHub> {
        &self.hub
    }

    pub fn source_classes(&self) -> Vec<String> {
        sorted_keys(&self.sources)
    }

    pub fn destination_classes(&self) -> Vec<String> {
        sorted_keys(&self.destinations)
    }

    /// Builds the source plugin named by `class`.
    pub fn create_source(
        &self,
        class: &str,
        ctx: &PluginContext<'_>,
    ) -> Result<Arc<dyn AppSource>, PluginError> {
        let registration = self.sources.get(class).ok_or_else(|| PluginError::UnknownClass {
            kind: "source",
            class: class.to_string(),
        })?;
        if !registration.supports(ctx.engine_type) {
            return Err(PluginError::IncompatibleEngine {
                kind: "source",
                class: class.to_string(),
                engine: ctx.engine_type.to_string(),
            });
        }
        (registration.constructor)(ctx)
    }

    /// Builds the destination plugin named by `class`.
    pub fn create_destination(
        &self,
        class: &str,
        ctx: &PluginContext<'_>,
    ) -> Result<Arc<dyn AppDestination>, PluginError> {
        let registration =
            self.destinations
                .get(class)
                .ok_or_else(|| PluginError::UnknownClass {
                    kind: "destination",
                    class: class.to_string(),
                })?;
        if !registration.supports(ctx.engine_type) {
            return Err(PluginError::IncompatibleEngine {
                kind: "destination",
                class: class.to_string(),
                engine: ctx.engine_type.to_string(),
            });
        }
        (registration.constructor)(ctx)
    }
}

fn sorted_keys<V>(map: &HashMap<String, V>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort();
    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Frame;
    use crate::request::PipelineRequest;
    use serde_json::{json, Value};

    struct NullDestination;

    impl AppDestination for NullDestination {
        fn name(&self) -> &str {
            "Null"
        }

        fn process_frame(&self, _frame: &Frame) -> Result<(), PluginError> {
            Ok(())
        }

        fn finish(&self) {}
    }

    fn context<'a>(
        hub: &'a Arc<ChannelHub>,
        request: &'a PipelineRequest,
        section: &'a Value,
        engine_type: &'a str,
    ) -> PluginContext<'a> {
        PluginContext {
            instance_id: "job-1",
            engine_type,
            request,
            section,
            input: None,
            hub,
            streaming: None,
        }
    }

    #[test]
    fn test_builtins_registered() {
        let registry = PluginRegistry::with_builtins();
        assert_eq!(registry.source_classes(), vec![CHANNEL_SOURCE.to_string()]);
        assert_eq!(
            registry.destination_classes(),
            vec![CHANNEL_DESTINATION.to_string(), WEBRTC_DESTINATION.to_string()]
        );
    }

    #[test]
    fn test_unknown_class() {
        let registry = PluginRegistry::with_builtins();
        let request = PipelineRequest::new();
        let section = json!({});
        let ctx = context(registry.hub(), &request, &section, "mock");
        assert!(matches!(
            registry.create_destination("Nope", &ctx),
            Err(PluginError::UnknownClass { kind: "destination", .. })
        ));
        assert!(matches!(
            registry.create_source("Nope", &ctx),
            Err(PluginError::UnknownClass { kind: "source", .. })
        ));
    }

    #[test]
    fn test_engine_compatibility() {
        let mut registry = PluginRegistry::new();
        registry.register_destination("Null", ["FFmpeg"], |_ctx: &PluginContext<'_>| {
            Ok(Arc::new(NullDestination) as Arc<dyn AppDestination>)
        });
        let request = PipelineRequest::new();
        let section = json!({});

        let ctx = context(registry.hub(), &request, &section, "FFmpeg");
        let destination = registry.create_destination("Null", &ctx).unwrap();
        assert_eq!(destination.name(), "Null");

        let ctx = context(registry.hub(), &request, &section, "mock");
        assert_eq!(
            registry.create_destination("Null", &ctx).err(),
            Some(PluginError::IncompatibleEngine {
                kind: "destination",
                class: "Null".to_string(),
                engine: "mock".to_string(),
            })
        );
    }

    #[test]
    fn test_webrtc_requires_streaming() {
        let registry = PluginRegistry::with_builtins();
        let request = PipelineRequest::new();
        let section = json!({"type": "webrtc", "peer-id": "p1"});
        let ctx = context(registry.hub(), &request, &section, "mock");
        assert!(matches!(
            registry.create_destination(WEBRTC_DESTINATION, &ctx),
            Err(PluginError::Construction { .. })
        ));
    }
}
