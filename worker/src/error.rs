use reqwest::StatusCode;

/// Errores del worker fuera del ciclo de vida de las tareas.
///
/// Las fallas de una tarea nunca llegan acá: se reportan como un
/// `TaskInfo` en estado FAILED en el próximo heartbeat.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("configuración inválida para {key}: {message}")]
    Config { key: &'static str, message: String },

    #[error("no hay runtime de tokio disponible: {0}")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("error HTTP hablando con el master: {0}")]
    Master(#[from] reqwest::Error),

    #[error("el master devolvió status {0}")]
    MasterStatus(StatusCode),

    #[error("la tarea fue interrumpida")]
    Interrupted,
}

impl WorkerError {
    pub fn config(key: &'static str, message: impl Into<String>) -> Self {
        WorkerError::Config {
            key,
            message: message.into(),
        }
    }
}
