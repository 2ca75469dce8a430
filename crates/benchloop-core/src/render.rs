//! Hand-off of captured profiles to an external renderer.
//!
//! The renderer is invoked as
//! `<command> -text|-svg [-base <base>] [<binary>] <profile>` and its stdout
//! is captured next to the profile. Nothing here interprets profile data.

use crate::error::{BenchError, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Output flavour requested from the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderFormat {
    /// Plain-text top listing.
    #[default]
    Text,
    /// SVG call graph.
    Svg,
}

impl RenderFormat {
    fn flag(self) -> &'static str {
        match self {
            Self::Text => "-text",
            Self::Svg => "-svg",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Svg => "svg",
        }
    }
}

/// External profile renderer.
#[derive(Debug, Clone)]
pub struct ProfileRenderer {
    command: String,
    format: RenderFormat,
    binary: Option<PathBuf>,
}

impl ProfileRenderer {
    /// Renderer running `command` for the current executable.
    pub fn new(command: impl Into<String>, format: RenderFormat) -> Self {
        let binary = std::env::current_exe()
            .map_err(|e| tracing::debug!("Cannot resolve current executable: {}", e))
            .ok();
        Self {
            command: command.into(),
            format,
            binary,
        }
    }

    /// Override the binary passed for symbol resolution.
    #[must_use]
    pub fn with_binary(mut self, binary: Option<PathBuf>) -> Self {
        self.binary = binary;
        self
    }

    /// Requested output format.
    pub fn format(&self) -> RenderFormat {
        self.format
    }

    /// Render `profile`, optionally as a diff against `base`.
    ///
    /// Returns the path of the rendered output. On failure the partial output
    /// is removed.
    pub fn render(&self, profile: &Path, base: Option<&Path>) -> Result<PathBuf> {
        let out_path = profile.with_extension(self.format.extension());
        let out = File::create(&out_path).map_err(|e| self.error(profile, e.to_string()))?;

        let mut cmd = Command::new(&self.command);
        cmd.arg(self.format.flag());
        if let Some(base) = base {
            cmd.arg("-base").arg(base);
        }
        if let Some(binary) = &self.binary {
            cmd.arg(binary);
        }
        cmd.arg(profile)
            .stdin(Stdio::null())
            .stdout(Stdio::from(out))
            .stderr(Stdio::piped());

        tracing::debug!("Rendering {} with {:?}", profile.display(), cmd);
        let result = match cmd.output() {
            Ok(output) if output.status.success() => Ok(out_path.clone()),
            Ok(output) => Err(self.error(
                profile,
                format!(
                    "{} exited with {}: {}",
                    self.command,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            )),
            Err(e) => Err(self.error(profile, format!("failed to run {}: {e}", self.command))),
        };

        if result.is_err() {
            let _ = std::fs::remove_file(&out_path);
        }
        result
    }

    fn error(&self, profile: &Path, reason: String) -> BenchError {
        BenchError::Render {
            profile: profile.to_path_buf(),
            reason,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Write an executable script that echoes its arguments.
    fn fake_renderer(dir: &Path, exit_code: i32) -> PathBuf {
        let path = dir.join("fake-pprof");
        std::fs::write(&path, format!("#!/bin/sh\necho \"$@\"\nexit {exit_code}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn test_render_captures_stdout() {
        let dir = tempfile::TempDir::new().unwrap();
        let tool = fake_renderer(dir.path(), 0);
        let profile = dir.path().join("cpuprof-abc.prof");
        std::fs::write(&profile, b"x").unwrap();

        let renderer = ProfileRenderer::new(tool.to_string_lossy(), RenderFormat::Text)
            .with_binary(Some(PathBuf::from("/bin/bench")));
        let out = renderer.render(&profile, None).unwrap();

        assert_eq!(out, dir.path().join("cpuprof-abc.txt"));
        let text = std::fs::read_to_string(out).unwrap();
        assert_eq!(text.trim(), format!("-text /bin/bench {}", profile.display()));
    }

    #[test]
    fn test_render_diff_passes_base() {
        let dir = tempfile::TempDir::new().unwrap();
        let tool = fake_renderer(dir.path(), 0);
        let profile = dir.path().join("memprof-abc.prof");
        let base = dir.path().join("memprof0-abc.prof");

        let renderer =
            ProfileRenderer::new(tool.to_string_lossy(), RenderFormat::Svg).with_binary(None);
        let out = renderer.render(&profile, Some(&base)).unwrap();

        assert_eq!(out.extension().unwrap(), "svg");
        let text = std::fs::read_to_string(out).unwrap();
        assert!(text.starts_with(&format!("-svg -base {}", base.display())));
    }

    #[test]
    fn test_render_failure_removes_output() {
        let dir = tempfile::TempDir::new().unwrap();
        let tool = fake_renderer(dir.path(), 1);
        let profile = dir.path().join("cpuprof-abc.prof");

        let renderer = ProfileRenderer::new(tool.to_string_lossy(), RenderFormat::Text);
        let err = renderer.render(&profile, None).unwrap_err();

        assert!(matches!(err, BenchError::Render { .. }));
        assert!(!dir.path().join("cpuprof-abc.txt").exists());
    }

    #[test]
    fn test_missing_renderer_is_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let profile = dir.path().join("cpuprof-abc.prof");
        let renderer = ProfileRenderer::new("/nonexistent/pprof-12345", RenderFormat::Text);
        assert!(renderer.render(&profile, None).is_err());
    }
}
