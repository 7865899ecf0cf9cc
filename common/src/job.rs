use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type JobId = i64;

/// Argumentos de una tarea. El master los arma al descomponer el job;
/// el worker sólo los pasa tal cual a la definición del job.
pub type TaskArgs = Value;

/// Configuración del job al que pertenece una tarea.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// Nombre de la definición a ejecutar, ej: "wordcount", "sleep".
    pub name: String,
}

impl JobConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
