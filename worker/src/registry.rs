use anyhow::Result;
use common::{JobConfig, TaskArgs};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::jobs::{BusyJob, EchoJob, FailJob, NoopJob, SleepJob, WordCountJob};
use crate::runner::TaskContext;

/// Cómputo propio de un tipo de job. Corre en un hilo bloqueante del pool.
///
/// Una definición que quiera ser cancelable debe consultar
/// `ctx.is_interrupted()` (o usar `ctx.sleep`) y cortar cuanto antes;
/// lo que devuelva después de una interrupción se descarta.
pub trait JobDefinition: Send + Sync {
    fn name(&self) -> &str;

    fn run_task(&self, config: &JobConfig, args: &TaskArgs, ctx: &TaskContext) -> Result<Value>;
}

/// Registro nombre -> definición de job.
#[derive(Default)]
pub struct JobRegistry {
    definitions: RwLock<HashMap<String, Arc<dyn JobDefinition>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registro con las definiciones que vienen con el worker.
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(NoopJob));
        registry.register(Arc::new(EchoJob));
        registry.register(Arc::new(SleepJob));
        registry.register(Arc::new(BusyJob));
        registry.register(Arc::new(FailJob));
        registry.register(Arc::new(WordCountJob));
        registry
    }

    /// Registra (o reemplaza) una definición bajo su propio nombre.
    pub fn register(&self, definition: Arc<dyn JobDefinition>) {
        let name = definition.name().to_string();
        self.definitions.write().insert(name, definition);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn JobDefinition>> {
        self.definitions.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.definitions.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_builtin_tiene_todos_los_jobs() {
        let registry = JobRegistry::with_builtin();

        assert_eq!(
            registry.names(),
            vec!["busy", "echo", "fail", "noop", "sleep", "wordcount"]
        );
        assert!(registry.get("wordcount").is_some());
        assert!(registry.get("desconocido").is_none());
    }

    #[test]
    fn register_reemplaza_por_nombre() {
        let registry = JobRegistry::new();
        registry.register(Arc::new(NoopJob));
        registry.register(Arc::new(NoopJob));

        assert_eq!(registry.names(), vec!["noop"]);
    }
}
