use crate::config::AnalysisConfig;
use crate::error::AnalysisError;
use crate::haf::{HeapAbstraction, HeapAbstractionFactory, RecencyHeapAbstraction};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// A named heap abstraction policy, registered at link time with
/// [`register_heap_abstraction!`](crate::register_heap_abstraction).
pub struct HafFactory {
    pub name: &'static str,
    pub description: &'static str,
    pub build: fn(&AnalysisConfig) -> Arc<dyn HeapAbstractionFactory>,
}

inventory::collect!(HafFactory);

#[macro_export]
macro_rules! register_heap_abstraction {
    ($name:literal, $description:literal, $build:path) => {
        inventory::submit! {
            $crate::haf::HafFactory {
                name: $name,
                description: $description,
                build: $build,
            }
        }
    };
}

static POLICY_REGISTRY: OnceLock<HashMap<&'static str, &'static HafFactory>> = OnceLock::new();

fn build_policy_registry() -> HashMap<&'static str, &'static HafFactory> {
    let mut m = HashMap::new();
    for f in inventory::iter::<HafFactory> {
        if m.insert(f.name, f).is_some() {
            tracing::warn!(name = f.name, "heap abstraction registered twice");
        }
    }
    m
}

pub fn lookup_policy(name: &str) -> Option<&'static HafFactory> {
    POLICY_REGISTRY
        .get_or_init(build_policy_registry)
        .get(name)
        .copied()
}

/// Every registered policy, ordered by name.
pub fn policies() -> Vec<&'static HafFactory> {
    let mut all: Vec<_> = POLICY_REGISTRY
        .get_or_init(build_policy_registry)
        .values()
        .copied()
        .collect();
    all.sort_by_key(|f| f.name);
    all
}

/// Instantiate the policy `config` asks for.
pub fn heap_abstraction(config: &AnalysisConfig) -> Result<HeapAbstraction, AnalysisError> {
    let factory = lookup_policy(&config.policy)
        .ok_or_else(|| AnalysisError::UnknownPolicy(config.policy.clone()))?;
    let policy = (factory.build)(config);
    let policy: Arc<dyn HeapAbstractionFactory> = if config.recency {
        Arc::new(RecencyHeapAbstraction::new(policy))
    } else {
        policy
    };
    Ok(HeapAbstraction::new(policy, config.verify_policy))
}
