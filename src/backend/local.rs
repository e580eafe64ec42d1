//! Local backend: runs a PlantUML engine as a subprocess.
//!
//! The engine reads the diagram on stdin and writes the artifact to stdout.
//! A `.jar` engine is launched through the configured Java runtime; anything
//! else is executed directly with the same flags. PNG output is base64-encoded
//! so it can be embedded as a data URL. For PNG a second, independent run
//! with `-pipemap` produces the image map.
//!
//! Results are cached by request key; a hit skips the engine entirely.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use puml_render_config::{OutputFormat, RenderConfig};

use super::process::{Invocation, ProcessOutput, ProcessRunner};
use super::{ImageSource, RenderResult, usable_map};
use crate::cache::RenderCache;
use crate::error::RenderError;
use crate::source::DiagramSource;

/// What a single engine run should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOutput {
    Artifact(OutputFormat),
    ImageMap,
}

/// Resolve the configured engine path.
///
/// Accepts `~`, `~/...` or `~\...` (home-relative), an absolute path, or a
/// path relative to `project_root`.
pub fn resolve_engine_path(configured: &str, project_root: &Path) -> Result<PathBuf, RenderError> {
    let configured = configured.trim();
    if configured.is_empty() {
        return Err(RenderError::Configuration(
            "no local PlantUML engine path is configured".to_string(),
        ));
    }

    let home_relative = match configured.strip_prefix('~') {
        Some("") => Some(""),
        Some(rest) if rest.starts_with(['/', '\\']) => Some(&rest[1..]),
        _ => None,
    };
    if let Some(rest) = home_relative {
        let home = dirs::home_dir().ok_or_else(|| {
            RenderError::Configuration(format!(
                "cannot expand '{configured}': home directory is unknown"
            ))
        })?;
        return Ok(if rest.is_empty() { home } else { home.join(rest) });
    }

    let path = Path::new(configured);
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(project_root.join(path))
    }
}

fn is_jar(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jar"))
}

pub struct LocalBackend {
    engine_path: String,
    java_path: String,
    dot_path: String,
    project_root: PathBuf,
    process_timeout: Option<Duration>,
    lenient_exit_codes: bool,
    runner: Arc<dyn ProcessRunner>,
    cache: Option<RenderCache>,
}

impl LocalBackend {
    pub fn new(config: &RenderConfig, project_root: impl Into<PathBuf>, runner: Arc<dyn ProcessRunner>) -> Self {
        Self {
            engine_path: config.local_jar.clone(),
            java_path: config.java_path.clone(),
            dot_path: config.dot_path.clone(),
            project_root: project_root.into(),
            process_timeout: config.process_timeout(),
            lenient_exit_codes: config.lenient_exit_codes,
            runner,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: RenderCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Build the command line for one engine run.
    pub fn invocation(&self, output: EngineOutput) -> Result<Invocation, RenderError> {
        let engine = resolve_engine_path(&self.engine_path, &self.project_root)?;
        let engine = engine.to_string_lossy().into_owned();

        let mut args: Vec<String> = Vec::new();
        let program = if is_jar(Path::new(&engine)) {
            args.push("-jar".into());
            args.push(engine);
            match self.java_path.trim() {
                "" => "java".to_string(),
                java => java.to_string(),
            }
        } else {
            engine
        };

        args.extend([
            "-Djava.awt.headless=true".to_string(),
            "-charset".to_string(),
            "utf-8".to_string(),
        ]);
        let dot = self.dot_path.trim();
        if !dot.is_empty() {
            args.push("-graphvizdot".into());
            args.push(dot.to_string());
        }
        match output {
            EngineOutput::Artifact(format) => {
                args.push(format.engine_flag());
                args.push("-pipe".into());
            }
            EngineOutput::ImageMap => args.push("-pipemap".into()),
        }

        Ok(Invocation { program, args })
    }

    pub async fn render(
        &self,
        source: &DiagramSource,
        format: OutputFormat,
        document_dir: Option<&Path>,
    ) -> Result<RenderResult, RenderError> {
        let key = source.key();
        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&key, format)) {
            return Ok(hit);
        }

        let stdout = self
            .run(EngineOutput::Artifact(format), source, document_dir)
            .await?;

        let result = match format {
            OutputFormat::Png => {
                let map = match self.run(EngineOutput::ImageMap, source, document_dir).await {
                    Ok(bytes) => usable_map(String::from_utf8_lossy(&bytes).into_owned()),
                    Err(e) => {
                        crate::debug_info!("LOCAL", "Map generation failed, showing image only: {}", e);
                        None
                    }
                };
                RenderResult::Raster {
                    image: ImageSource::Base64(BASE64_STANDARD.encode(&stdout)),
                    map,
                }
            }
            OutputFormat::Svg => RenderResult::Vector(String::from_utf8_lossy(&stdout).into_owned()),
            OutputFormat::Txt => RenderResult::Text(String::from_utf8_lossy(&stdout).into_owned()),
        };

        if let Some(cache) = &self.cache {
            cache.put(&key, &result);
        }
        Ok(result)
    }

    /// Run the engine once and return its stdout.
    async fn run(
        &self,
        output: EngineOutput,
        source: &DiagramSource,
        document_dir: Option<&Path>,
    ) -> Result<Vec<u8>, RenderError> {
        let invocation = self.invocation(output)?;
        crate::debug_log!("LOCAL", "Running {} in {:?}", invocation, document_dir);

        let run = self
            .runner
            .run(&invocation, source.as_str().as_bytes(), document_dir);
        let finished = match self.process_timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| RenderError::Timeout(limit.as_millis() as u64))?,
            None => run.await,
        };

        let output = finished.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                RenderError::CommandNotFound(format!("{}: {e}", invocation.program))
            }
            _ => RenderError::Process {
                exit_code: None,
                stderr: e.to_string(),
            },
        })?;

        self.check_exit(output)
    }

    fn check_exit(&self, output: ProcessOutput) -> Result<Vec<u8>, RenderError> {
        match output.code {
            Some(0) => {}
            Some(1) => {
                return Err(RenderError::Process {
                    exit_code: Some(1),
                    stderr: output.stderr,
                });
            }
            Some(code) if self.lenient_exit_codes => {
                crate::debug_info!("LOCAL", "Engine exited with {}, accepting output", code);
            }
            code => {
                return Err(RenderError::Process {
                    exit_code: code,
                    stderr: output.stderr,
                });
            }
        }

        if output.stdout.is_empty() {
            return Err(RenderError::NoOutput);
        }
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::process::ProcessFuture;
    use crate::cache::MemoryStore;
    use parking_lot::Mutex;

    /// Replies with canned outputs keyed on whether `-pipemap` was requested.
    #[derive(Default)]
    struct ScriptedRunner {
        artifact: Mutex<Option<std::io::Result<ProcessOutput>>>,
        map: Mutex<Option<std::io::Result<ProcessOutput>>>,
        calls: Mutex<Vec<(Invocation, String, Option<PathBuf>)>>,
    }

    impl ScriptedRunner {
        fn artifact(self, output: std::io::Result<ProcessOutput>) -> Self {
            *self.artifact.lock() = Some(output);
            self
        }

        fn map(self, output: std::io::Result<ProcessOutput>) -> Self {
            *self.map.lock() = Some(output);
            self
        }
    }

    impl ProcessRunner for ScriptedRunner {
        fn run<'a>(
            &'a self,
            invocation: &'a Invocation,
            input: &'a [u8],
            cwd: Option<&'a Path>,
        ) -> ProcessFuture<'a> {
            self.calls.lock().push((
                invocation.clone(),
                String::from_utf8_lossy(input).into_owned(),
                cwd.map(Path::to_path_buf),
            ));
            let slot = if invocation.args.iter().any(|a| a == "-pipemap") {
                &self.map
            } else {
                &self.artifact
            };
            let reply = slot.lock().take().unwrap_or_else(|| {
                Err(std::io::Error::other("no scripted reply"))
            });
            Box::pin(async move { reply })
        }
    }

    fn ok(stdout: &[u8]) -> std::io::Result<ProcessOutput> {
        Ok(ProcessOutput {
            code: Some(0),
            stdout: stdout.to_vec(),
            stderr: String::new(),
        })
    }

    fn config(jar: &str) -> RenderConfig {
        RenderConfig {
            local_jar: jar.to_string(),
            ..RenderConfig::default()
        }
    }

    fn backend(cfg: &RenderConfig, runner: ScriptedRunner) -> (LocalBackend, Arc<ScriptedRunner>) {
        let runner = Arc::new(runner);
        let backend = LocalBackend::new(cfg, "/project", runner.clone());
        (backend, runner)
    }

    #[test]
    fn test_resolve_engine_path_forms() {
        let root = Path::new("/project");
        assert_eq!(
            resolve_engine_path("/opt/plantuml.jar", root).unwrap(),
            PathBuf::from("/opt/plantuml.jar")
        );
        assert_eq!(
            resolve_engine_path("tools/plantuml.jar", root).unwrap(),
            PathBuf::from("/project/tools/plantuml.jar")
        );
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                resolve_engine_path("~/tools/engine.jar", root).unwrap(),
                home.join("tools/engine.jar")
            );
            assert_eq!(resolve_engine_path("~", root).unwrap(), home);
            assert_eq!(
                resolve_engine_path("~\\engine.jar", root).unwrap(),
                home.join("engine.jar")
            );
        }
        assert_eq!(
            resolve_engine_path("~engine.jar", root).unwrap(),
            PathBuf::from("/project/~engine.jar")
        );
    }

    #[test]
    fn test_resolve_empty_path_is_configuration_error() {
        let err = resolve_engine_path("  ", Path::new("/project")).unwrap_err();
        assert!(matches!(err, RenderError::Configuration(_)));
    }

    #[test]
    fn test_jar_invocation() {
        let cfg = RenderConfig {
            java_path: "/usr/bin/java".into(),
            dot_path: "/usr/bin/dot".into(),
            ..config("/opt/plantuml.jar")
        };
        let (backend, _) = backend(&cfg, ScriptedRunner::default());
        let invocation = backend
            .invocation(EngineOutput::Artifact(OutputFormat::Svg))
            .unwrap();
        assert_eq!(invocation.program, "/usr/bin/java");
        assert_eq!(
            invocation.args,
            vec![
                "-jar",
                "/opt/plantuml.jar",
                "-Djava.awt.headless=true",
                "-charset",
                "utf-8",
                "-graphvizdot",
                "/usr/bin/dot",
                "-tsvg",
                "-pipe",
            ]
        );
    }

    #[test]
    fn test_native_engine_and_map_invocation() {
        let (backend, _) = backend(&config("/usr/local/bin/plantuml"), ScriptedRunner::default());
        let invocation = backend.invocation(EngineOutput::ImageMap).unwrap();
        assert_eq!(invocation.program, "/usr/local/bin/plantuml");
        assert_eq!(
            invocation.args,
            vec!["-Djava.awt.headless=true", "-charset", "utf-8", "-pipemap"]
        );
    }

    #[tokio::test]
    async fn test_png_is_base64_with_map() {
        let runner = ScriptedRunner::default()
            .artifact(ok(b"\x89PNG"))
            .map(ok(b"<map id=\"k\"></map>"));
        let (backend, runner) = backend(&config("/opt/plantuml.jar"), runner);
        let source = DiagramSource::from_final("A -> B");

        let result = backend
            .render(&source, OutputFormat::Png, Some(Path::new("/notes")))
            .await
            .unwrap();
        assert_eq!(
            result,
            RenderResult::Raster {
                image: ImageSource::Base64(BASE64_STANDARD.encode(b"\x89PNG")),
                map: Some("<map id=\"k\"></map>".into()),
            }
        );

        let calls = runner.calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].1, "A -> B");
        assert_eq!(calls[0].2.as_deref(), Some(Path::new("/notes")));
        assert!(calls[0].0.args.contains(&"-tpng".to_string()));
        assert!(calls[1].0.args.contains(&"-pipemap".to_string()));
    }

    #[tokio::test]
    async fn test_png_survives_map_failure() {
        let runner = ScriptedRunner::default().artifact(ok(b"\x89PNG"));
        let (backend, _) = backend(&config("/opt/plantuml.jar"), runner);
        let result = backend
            .render(&DiagramSource::from_final("A -> B"), OutputFormat::Png, None)
            .await
            .unwrap();
        assert!(matches!(result, RenderResult::Raster { map: None, .. }));
    }

    #[tokio::test]
    async fn test_exit_one_rejects_with_stderr() {
        let runner = ScriptedRunner::default().artifact(Ok(ProcessOutput {
            code: Some(1),
            stdout: Vec::new(),
            stderr: "syntax error".into(),
        }));
        let (backend, _) = backend(&config("~/tools/engine.jar"), runner);
        let err = backend
            .render(&DiagramSource::from_final("A ->"), OutputFormat::Txt, None)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            RenderError::Process {
                exit_code: Some(1),
                stderr: "syntax error".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_other_exit_codes_fail_unless_lenient() {
        let output = || {
            Ok(ProcessOutput {
                code: Some(2),
                stdout: b"partial".to_vec(),
                stderr: "warning".into(),
            })
        };
        let source = DiagramSource::from_final("A -> B");

        let (strict, _) = backend(&config("/opt/p.jar"), ScriptedRunner::default().artifact(output()));
        let err = strict.render(&source, OutputFormat::Txt, None).await.unwrap_err();
        assert!(matches!(err, RenderError::Process { exit_code: Some(2), .. }));

        let cfg = RenderConfig {
            lenient_exit_codes: true,
            ..config("/opt/p.jar")
        };
        let (lenient, _) = backend(&cfg, ScriptedRunner::default().artifact(output()));
        let result = lenient.render(&source, OutputFormat::Txt, None).await.unwrap();
        assert_eq!(result, RenderResult::Text("partial".into()));
    }

    #[tokio::test]
    async fn test_empty_output_is_no_output() {
        let (backend, _) = backend(&config("/opt/p.jar"), ScriptedRunner::default().artifact(ok(b"")));
        let err = backend
            .render(&DiagramSource::from_final("A -> B"), OutputFormat::Svg, None)
            .await
            .unwrap_err();
        assert_eq!(err, RenderError::NoOutput);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_command_not_found() {
        let runner = ScriptedRunner::default().artifact(Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "No such file or directory",
        )));
        let (backend, _) = backend(&config("/opt/p.jar"), runner);
        let err = backend
            .render(&DiagramSource::from_final("A -> B"), OutputFormat::Svg, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::CommandNotFound(msg) if msg.starts_with("java")));
    }

    #[tokio::test]
    async fn test_empty_engine_path_fails_before_spawning() {
        let (backend, runner) = backend(&config(""), ScriptedRunner::default());
        let err = backend
            .render(&DiagramSource::from_final("A -> B"), OutputFormat::Svg, None)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Configuration(_)));
        assert!(runner.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_engine() {
        let store = Arc::new(MemoryStore::new());
        let runner = ScriptedRunner::default().artifact(ok(b"<svg/>"));
        let (backend, runner) = backend(&config("/opt/p.jar"), runner);
        let backend = backend.with_cache(RenderCache::new(store.clone()));
        let source = DiagramSource::from_final("A -> B");

        let first = backend.render(&source, OutputFormat::Svg, None).await.unwrap();
        let second = backend.render(&source, OutputFormat::Svg, None).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(runner.calls.lock().len(), 1);
        assert!(store.contains(&format!("svg-{}", source.key())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_process_timeout() {
        struct Hang;
        impl ProcessRunner for Hang {
            fn run<'a>(
                &'a self,
                _invocation: &'a Invocation,
                _input: &'a [u8],
                _cwd: Option<&'a Path>,
            ) -> ProcessFuture<'a> {
                Box::pin(std::future::pending())
            }
        }

        let cfg = RenderConfig {
            process_timeout_secs: Some(5),
            ..config("/opt/p.jar")
        };
        let backend = LocalBackend::new(&cfg, "/project", Arc::new(Hang));
        let err = backend
            .render(&DiagramSource::from_final("A -> B"), OutputFormat::Svg, None)
            .await
            .unwrap_err();
        assert_eq!(err, RenderError::Timeout(5000));
    }
}
