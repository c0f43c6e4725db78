/// Plugin installation on disk, and installation of the external dependencies a
/// plugin declares.
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// Plugin directories
// ---------------------------------------------------------------------------

pub struct PluginInstaller {
    pub plugins_dir: PathBuf,
}

impl PluginInstaller {
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self { plugins_dir: plugins_dir.into() }
    }

    /// Copy the plugin directory `source` into the plugins root. The plugin id is
    /// the source directory name.
    pub fn install_from_dir(&self, source: &Path) -> Result<PathBuf> {
        if !source.is_dir() {
            bail!("source is not a directory: {}", source.display());
        }
        let id = source
            .file_name()
            .context("source has no directory name")?
            .to_string_lossy()
            .to_string();
        let dest = self.plugins_dir.join(&id);
        if dest.exists() {
            bail!("plugin '{id}' is already installed");
        }
        std::fs::create_dir_all(&self.plugins_dir)?;
        copy_dir(source, &dest).context("copy plugin directory")?;
        info!("[Installer] installed plugin '{}' -> {}", id, dest.display());
        Ok(dest)
    }

    /// Delete the directory of `plugin_id`. Missing directories are fine.
    pub fn uninstall(&self, plugin_id: &str) -> Result<bool> {
        let path = self.plugins_dir.join(plugin_id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&path)
            .with_context(|| format!("remove plugin dir {}", path.display()))?;
        info!("[Installer] deleted plugin directory '{}'", plugin_id);
        Ok(true)
    }

    /// First-level plugin directories, sorted by name.
    pub fn list_installed(&self) -> Result<Vec<String>> {
        if !self.plugins_dir.exists() {
            return Ok(vec![]);
        }
        let mut names: Vec<String> = std::fs::read_dir(&self.plugins_dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|name| !name.starts_with('.'))
            .collect();
        names.sort();
        Ok(names)
    }
}

fn copy_dir(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let dst_path = dst.join(entry.file_name());
        if entry.path().is_dir() {
            copy_dir(&entry.path(), &dst_path)?;
        } else {
            std::fs::copy(entry.path(), dst_path)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// External dependencies
// ---------------------------------------------------------------------------

/// Installs what a plugin's dependency file lists. Runs before the plugin's
/// source units are read.
#[async_trait]
pub trait DependencyInstaller: Send + Sync {
    /// Name of the dependency file inside a plugin directory.
    fn file_name(&self) -> &str;

    async fn install(&self, plugin_dir: &Path, file: &Path) -> Result<()>;
}

/// Runs a shell-free command line per plugin; `{file}` is replaced by the
/// dependency file path and `{dir}` by the plugin directory.
pub struct CommandInstaller {
    file_name: String,
    command: Vec<String>,
}

impl CommandInstaller {
    pub fn new(file_name: impl Into<String>, command_line: &str) -> Self {
        Self {
            file_name: file_name.into(),
            command: command_line.split_whitespace().map(str::to_string).collect(),
        }
    }

    fn render(&self, plugin_dir: &Path, file: &Path) -> Vec<String> {
        self.command
            .iter()
            .map(|arg| {
                arg.replace("{file}", &file.display().to_string())
                    .replace("{dir}", &plugin_dir.display().to_string())
            })
            .collect()
    }
}

#[async_trait]
impl DependencyInstaller for CommandInstaller {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    async fn install(&self, plugin_dir: &Path, file: &Path) -> Result<()> {
        let argv = self.render(plugin_dir, file);
        let Some((program, args)) = argv.split_first() else {
            bail!("empty dependency install command");
        };
        info!(
            program = %program,
            dir = %plugin_dir.display(),
            "[Installer] installing plugin dependencies"
        );
        let output = Command::new(program)
            .args(args)
            .current_dir(plugin_dir)
            .output()
            .await
            .with_context(|| format!("spawn {program}"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(status = ?output.status.code(), "[Installer] dependency install failed");
            bail!("{program} exited with {}: {}", output.status, stderr.trim());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn install_copy_list_uninstall() {
        let src_root = tempfile::tempdir().unwrap();
        let src = src_root.path().join("pirate");
        std::fs::create_dir_all(src.join("units")).unwrap();
        std::fs::write(src.join("units/speak.yaml"), "hooks: []").unwrap();

        let root = tempfile::tempdir().unwrap();
        let installer = PluginInstaller::new(root.path());
        let dest = installer.install_from_dir(&src).unwrap();
        assert!(dest.join("units/speak.yaml").exists());
        assert!(installer.install_from_dir(&src).is_err());
        assert_eq!(installer.list_installed().unwrap(), vec!["pirate"]);

        assert!(installer.uninstall("pirate").unwrap());
        assert!(!installer.uninstall("pirate").unwrap());
        assert!(installer.list_installed().unwrap().is_empty());
    }

    #[test]
    fn command_placeholders_are_rendered() {
        let ci =
            CommandInstaller::new("requirements.txt", "pip install -r {file} --target {dir}/.deps");
        let argv = ci.render(Path::new("/p/pirate"), Path::new("/p/pirate/requirements.txt"));
        assert_eq!(
            argv,
            vec![
                "pip",
                "install",
                "-r",
                "/p/pirate/requirements.txt",
                "--target",
                "/p/pirate/.deps"
            ]
        );
        assert_eq!(ci.file_name(), "requirements.txt");
    }

    #[tokio::test]
    async fn empty_command_fails() {
        let ci = CommandInstaller::new("deps.txt", "   ");
        let dir = tempfile::tempdir().unwrap();
        assert!(ci.install(dir.path(), &dir.path().join("deps.txt")).await.is_err());
    }
}
