//! Definiciones de job que vienen con el worker.

use anyhow::{anyhow, bail, Context, Result};
use common::{JobConfig, TaskArgs};
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    fs::{self, File},
    io::{self, BufRead, BufReader, BufWriter, Write},
    path::Path,
    time::Duration,
};

use crate::registry::JobDefinition;
use crate::runner::TaskContext;

/// No hace nada, devuelve null.
pub struct NoopJob;

impl JobDefinition for NoopJob {
    fn name(&self) -> &str {
        "noop"
    }

    fn run_task(&self, _config: &JobConfig, _args: &TaskArgs, _ctx: &TaskContext) -> Result<Value> {
        Ok(Value::Null)
    }
}

/// Devuelve los argumentos tal cual.
pub struct EchoJob;

impl JobDefinition for EchoJob {
    fn name(&self) -> &str {
        "echo"
    }

    fn run_task(&self, _config: &JobConfig, args: &TaskArgs, _ctx: &TaskContext) -> Result<Value> {
        Ok(args.clone())
    }
}

#[derive(Debug, Deserialize)]
struct SleepArgs {
    ms: u64,
}

fn sleep_args(args: &TaskArgs) -> Result<SleepArgs> {
    SleepArgs::deserialize(args).context("argumentos inválidos, se espera {\"ms\": n}")
}

/// Duerme `ms` milisegundos; corta apenas llega una interrupción.
pub struct SleepJob;

impl JobDefinition for SleepJob {
    fn name(&self) -> &str {
        "sleep"
    }

    fn run_task(&self, _config: &JobConfig, args: &TaskArgs, ctx: &TaskContext) -> Result<Value> {
        let SleepArgs { ms } = sleep_args(args)?;
        ctx.sleep(Duration::from_millis(ms))?;
        Ok(json!({ "slept_ms": ms }))
    }
}

/// Como `sleep`, pero todo el trabajo es no interrumpible.
pub struct BusyJob;

impl JobDefinition for BusyJob {
    fn name(&self) -> &str {
        "busy"
    }

    fn run_task(&self, _config: &JobConfig, args: &TaskArgs, ctx: &TaskContext) -> Result<Value> {
        let SleepArgs { ms } = sleep_args(args)?;
        ctx.uninterruptible(|| std::thread::sleep(Duration::from_millis(ms)))?;
        Ok(json!({ "slept_ms": ms }))
    }
}

/// Siempre falla, con el mensaje de `args.message` si viene.
pub struct FailJob;

impl JobDefinition for FailJob {
    fn name(&self) -> &str {
        "fail"
    }

    fn run_task(&self, _config: &JobConfig, args: &TaskArgs, _ctx: &TaskContext) -> Result<Value> {
        let message = args
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("falla intencional");
        Err(anyhow!(message.to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct WordCountArgs {
    input_path: String,
    output_path: String,
}

/// WordCount sobre un archivo: escribe "palabra,conteo" ordenado por palabra.
pub struct WordCountJob;

impl JobDefinition for WordCountJob {
    fn name(&self) -> &str {
        "wordcount"
    }

    fn run_task(&self, _config: &JobConfig, args: &TaskArgs, ctx: &TaskContext) -> Result<Value> {
        let WordCountArgs {
            input_path,
            output_path,
        } = WordCountArgs::deserialize(args)
            .context("argumentos inválidos, se espera {\"input_path\", \"output_path\"}")?;

        let counts = count_words(Path::new(&input_path), || ctx.is_interrupted())
            .with_context(|| format!("no se pudo leer {}", input_path))?;
        ctx.check_interrupted()?;

        let distinct = counts.len();
        write_counts(Path::new(&output_path), counts)
            .with_context(|| format!("no se pudo escribir {}", output_path))?;

        Ok(json!({
            "distinct_words": distinct,
            "output_path": output_path,
        }))
    }
}

/// Cuenta palabras normalizadas (alfanumérico y '_', en minúscula).
/// `interrupted` se consulta por línea para poder cortar archivos grandes.
fn count_words(input_path: &Path, interrupted: impl Fn() -> bool) -> Result<HashMap<String, u64>> {
    let reader = BufReader::new(File::open(input_path)?);
    let mut counts: HashMap<String, u64> = HashMap::new();

    for line in reader.lines() {
        if interrupted() {
            bail!("interrumpida leyendo {}", input_path.display());
        }
        let line = line?;
        for raw in line.split_whitespace() {
            let cleaned: String = raw
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
                .to_lowercase();

            if !cleaned.is_empty() {
                *counts.entry(cleaned).or_insert(0) += 1;
            }
        }
    }

    Ok(counts)
}

fn write_counts(output_path: &Path, counts: HashMap<String, u64>) -> io::Result<()> {
    // Crear carpeta de salida si hace falta
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let mut writer = BufWriter::new(File::create(output_path)?);

    let mut entries: Vec<(String, u64)> = counts.into_iter().collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));

    for (word, count) in entries {
        writeln!(writer, "{},{}", word, count)?;
    }

    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir(sub: &str) -> PathBuf {
        let base = std::env::temp_dir().join("worker_jobs_tests").join(sub);
        let _ = fs::remove_dir_all(&base);
        fs::create_dir_all(&base).unwrap();
        base
    }

    /// Caso feliz: texto con mayúsculas, signos, etc.
    #[test]
    fn wordcount_cuenta_palabras_normalizadas() {
        let tmp = temp_dir("basic");
        let input_path = tmp.join("input.txt");
        let output_path = tmp.join("out.csv");

        let mut f = File::create(&input_path).unwrap();
        writeln!(f, "Hola hola, mundo!!").unwrap();
        writeln!(f, "mundo   mundo_prueba").unwrap();

        let counts = count_words(&input_path, || false).unwrap();
        assert_eq!(counts.len(), 3);
        write_counts(&output_path, counts).unwrap();

        let content = fs::read_to_string(&output_path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines, vec!["hola,2", "mundo,2", "mundo_prueba,1"]);
    }

    /// Debe crear directorios intermedios para el output si no existen.
    #[test]
    fn wordcount_crea_directorio_de_salida() {
        let tmp = temp_dir("nested");
        let input_path = tmp.join("input.txt");
        let nested_dir = tmp.join("subdir1").join("subdir2");
        let output_path = nested_dir.join("out.csv");

        let mut f = File::create(&input_path).unwrap();
        writeln!(f, "test test").unwrap();
        assert!(!nested_dir.exists());

        let counts = count_words(&input_path, || false).unwrap();
        write_counts(&output_path, counts).unwrap();

        let content = fs::read_to_string(&output_path).unwrap();
        assert_eq!(content.trim(), "test,2");
    }

    #[test]
    fn wordcount_input_inexistente_devuelve_error() {
        let tmp = temp_dir("missing");
        let res = count_words(&tmp.join("no_existe.txt"), || false);
        assert!(res.is_err());
    }

    #[test]
    fn wordcount_corta_si_hay_interrupcion() {
        let tmp = temp_dir("interrupted");
        let input_path = tmp.join("input.txt");
        fs::write(&input_path, "a b c\n").unwrap();

        let err = count_words(&input_path, || true).unwrap_err();
        assert!(err.to_string().contains("interrumpida"));
    }

    #[test]
    fn sleep_args_valida_formato() {
        assert_eq!(sleep_args(&json!({ "ms": 5 })).unwrap().ms, 5);
        assert!(sleep_args(&json!({ "segundos": 5 })).is_err());
    }
}
