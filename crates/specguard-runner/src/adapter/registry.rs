//! Name → factory registry for adapters.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::abstention::AbstentionGuardAdapter;
use super::chat::{ChatAdapter, ChatSettings};
use super::error::{AdapterError, AdapterResult};
use super::heuristic::HeuristicAdapter;
use super::open_source::OpenSourceExampleAdapter;
use super::process::ProcessAdapter;
use super::Adapter;

/// Settings shared by every factory; each adapter reads what it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterSettings {
    pub seed: u64,
    /// Abstain when a margin or soft delta is within this distance.
    pub margin_threshold: f64,
    /// Command line for the `process` adapter; falls back to
    /// `SPECGUARD_PROCESS_ADAPTER_CMD`.
    #[serde(default)]
    pub process_command: Option<Vec<String>>,
    #[serde(default)]
    pub chat: ChatSettings,
}

impl Default for AdapterSettings {
    fn default() -> Self {
        Self {
            seed: 7,
            margin_threshold: 0.25,
            process_command: None,
            chat: ChatSettings::default(),
        }
    }
}

impl AdapterSettings {
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_process_command(mut self, command: Vec<String>) -> Self {
        self.process_command = Some(command);
        self
    }
}

pub type AdapterFactory =
    Arc<dyn Fn(&AdapterSettings) -> AdapterResult<Box<dyn Adapter>> + Send + Sync>;

/// Registry of adapter factories keyed by name.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    factories: BTreeMap<String, AdapterFactory>,
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.names())
            .finish()
    }
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in adapter.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, AdapterFactory); 5] = [
            (HeuristicAdapter::NAME, Arc::new(heuristic)),
            (OpenSourceExampleAdapter::NAME, Arc::new(open_source_example)),
            (AbstentionGuardAdapter::NAME, Arc::new(abstention_guard)),
            (ProcessAdapter::NAME, Arc::new(process)),
            (ChatAdapter::NAME, Arc::new(openai_chat)),
        ];
        for (name, factory) in builtins {
            registry.factories.insert(name.to_string(), factory);
        }
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> AdapterResult<()>
    where
        F: Fn(&AdapterSettings) -> AdapterResult<Box<dyn Adapter>> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(AdapterError::DuplicateAdapter(name));
        }
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }

    /// Build a fresh adapter instance.
    pub fn create(&self, name: &str, settings: &AdapterSettings) -> AdapterResult<Box<dyn Adapter>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| AdapterError::UnknownAdapter(name.to_string()))?;
        factory(settings)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

// ---------------------------------------------------------------------------
// Built-in factories
// ---------------------------------------------------------------------------

fn heuristic(_: &AdapterSettings) -> AdapterResult<Box<dyn Adapter>> {
    Ok(Box::new(HeuristicAdapter::new()))
}

fn open_source_example(_: &AdapterSettings) -> AdapterResult<Box<dyn Adapter>> {
    Ok(Box::new(OpenSourceExampleAdapter::new()))
}

fn abstention_guard(settings: &AdapterSettings) -> AdapterResult<Box<dyn Adapter>> {
    Ok(Box::new(AbstentionGuardAdapter::new(
        settings.seed,
        settings.margin_threshold,
    )))
}

fn process(settings: &AdapterSettings) -> AdapterResult<Box<dyn Adapter>> {
    Ok(Box::new(ProcessAdapter::from_settings(settings)?))
}

fn openai_chat(settings: &AdapterSettings) -> AdapterResult<Box<dyn Adapter>> {
    Ok(Box::new(ChatAdapter::from_env(&settings.chat)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AgentRequest, AgentResponse};
    use async_trait::async_trait;

    struct Fixed;

    #[async_trait]
    impl Adapter for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn step(&mut self, _request: &AgentRequest) -> AdapterResult<AgentResponse> {
            Ok(AgentResponse::propose("CCO"))
        }
    }

    #[test]
    fn test_builtin_names() {
        let registry = AdapterRegistry::with_builtins();
        assert_eq!(
            registry.names(),
            vec![
                "abstention_guard",
                "heuristic",
                "open_source_example",
                "openai_chat",
                "process"
            ]
        );
    }

    #[test]
    fn test_create_builtin_and_unknown() {
        let registry = AdapterRegistry::with_builtins();
        let settings = AdapterSettings::default();
        let adapter = registry.create("heuristic", &settings).expect("heuristic");
        assert_eq!(adapter.name(), "heuristic");

        let err = registry.create("nope", &settings).err().expect("unknown adapter");
        assert!(matches!(err, AdapterError::UnknownAdapter(name) if name == "nope"));
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let mut registry = AdapterRegistry::new();
        registry
            .register("fixed", |_: &AdapterSettings| Ok(Box::new(Fixed) as Box<dyn Adapter>))
            .expect("first registration");
        let err = registry
            .register("fixed", |_: &AdapterSettings| Ok(Box::new(Fixed) as Box<dyn Adapter>))
            .expect_err("duplicate");
        assert!(matches!(err, AdapterError::DuplicateAdapter(_)));
        assert!(registry.contains("fixed"));
    }

    #[test]
    fn test_process_factory_reports_missing_command() {
        let registry = AdapterRegistry::with_builtins();
        let settings = AdapterSettings::default().with_process_command(Vec::new());
        let err = registry.create("process", &settings).err().expect("empty command");
        assert!(matches!(err, AdapterError::Config(_)));
    }
}
