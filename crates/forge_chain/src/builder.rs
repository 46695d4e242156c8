use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use forge_core::ForgeConfig;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::error::ForgeError;
use crate::sanitize::sanitize_module_name;
use crate::template::{TokenParams, render_contract_source, render_manifest};

/// Maximum captured size per stream (4 MB). Compiled bytecode for a single
/// coin module is a few KB.
const MAX_OUTPUT_BYTES: usize = 4 * 1_048_576;

/// Timeout for the `--version` check.
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

const MANIFEST_FILE: &str = "Move.toml";
const SOURCE_EXTENSION: &str = "move";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Paths of a freshly generated Move package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedPackageInfo {
    pub package_path: PathBuf,
    pub module_name: String,
    pub source_file_path: PathBuf,
    pub manifest_file_path: PathBuf,
}

/// Validated output of `sui move build --dump-bytecode-as-base64 --json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildOutput {
    /// Base64-encoded compiled modules.
    pub modules: Vec<String>,
    /// Object ids of the packages this one links against.
    pub dependencies: Vec<String>,
    pub digest: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BuilderOptions {
    pub compiler: String,
    pub timeout: Duration,
    pub output_dir: PathBuf,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            compiler: "sui".into(),
            timeout: Duration::from_secs(60),
            output_dir: PathBuf::from("generated_tokens"),
        }
    }
}

impl From<&ForgeConfig> for BuilderOptions {
    fn from(config: &ForgeConfig) -> Self {
        Self {
            compiler: config.compiler_binary.clone(),
            timeout: config.build_timeout(),
            output_dir: config.output_dir.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// PackageBuilder
// ---------------------------------------------------------------------------

/// Writes generated Move packages to disk and compiles them with the external
/// toolchain.
#[derive(Debug, Clone)]
pub struct PackageBuilder {
    options: BuilderOptions,
}

impl PackageBuilder {
    pub fn new(options: BuilderOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    /// Render and write `<output_dir>/<module>/{Move.toml, sources/<module>.move}`.
    ///
    /// Existing files for the same module are overwritten.
    pub async fn create_package(
        &self,
        params: &TokenParams,
    ) -> Result<GeneratedPackageInfo, ForgeError> {
        let raw_supply = params.validate()?;
        let module_name = sanitize_module_name(&params.name);
        let output_dir = params
            .output_dir
            .clone()
            .unwrap_or_else(|| self.options.output_dir.clone());

        let source = render_contract_source(params, &module_name, &raw_supply);
        let manifest = render_manifest(&module_name, params.framework_version());

        let package_path = output_dir.join(&module_name);
        let sources_dir = package_path.join("sources");
        let source_file_path = sources_dir.join(format!("{module_name}.{SOURCE_EXTENSION}"));
        let manifest_file_path = package_path.join(MANIFEST_FILE);

        tokio::fs::create_dir_all(&sources_dir).await?;
        tokio::fs::write(&source_file_path, source).await?;
        tokio::fs::write(&manifest_file_path, manifest).await?;

        info!(
            module = %module_name,
            path = %package_path.display(),
            "generated token package"
        );

        Ok(GeneratedPackageInfo {
            package_path,
            module_name,
            source_file_path,
            manifest_file_path,
        })
    }

    /// Delete a generated package directory. Missing directories are fine.
    pub async fn remove_package(&self, package_path: &Path) -> Result<(), ForgeError> {
        match tokio::fs::remove_dir_all(package_path).await {
            Ok(()) => {
                debug!(path = %package_path.display(), "removed generated package");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Verify the compiler binary runs; returns its version line.
    pub async fn ensure_toolchain(&self) -> Result<String, ForgeError> {
        let compiler = &self.options.compiler;
        let version_check = Command::new(compiler)
            .arg("--version")
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(VERSION_CHECK_TIMEOUT, version_check).await {
            Ok(Ok(output)) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
            }
            Ok(Ok(output)) => Err(ForgeError::ToolchainMissing(format!(
                "`{compiler} --version` exited with {}",
                output.status
            ))),
            Ok(Err(e)) => Err(ForgeError::ToolchainMissing(format!("{compiler}: {e}"))),
            Err(_) => Err(ForgeError::ToolchainMissing(format!(
                "`{compiler} --version` did not answer within {VERSION_CHECK_TIMEOUT:?}"
            ))),
        }
    }

    /// Compile the package at `package_path` and return its validated bytecode.
    pub async fn build(&self, package_path: &Path) -> Result<BuildOutput, ForgeError> {
        let version = self.ensure_toolchain().await?;
        let timeout = self.options.timeout;

        debug!(
            compiler = %self.options.compiler,
            version = %version,
            path = %package_path.display(),
            timeout_secs = timeout.as_secs(),
            "building move package"
        );

        let mut child = Command::new(&self.options.compiler)
            .arg("move")
            .arg("build")
            .arg("--dump-bytecode-as-base64")
            .arg("--path")
            .arg(package_path)
            .arg("--json")
            .current_dir(package_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let start = Instant::now();
        let mut stdout = child.stdout.take();
        let mut stderr = child.stderr.take();

        let result = tokio::time::timeout(timeout, async {
            let mut stdout_buf = Vec::new();
            let mut stderr_buf = Vec::new();

            let read_out = async {
                match stdout.as_mut() {
                    Some(out) => read_capped(out, &mut stdout_buf).await,
                    None => Ok(false),
                }
            };
            let read_err = async {
                match stderr.as_mut() {
                    Some(err) => read_capped(err, &mut stderr_buf).await,
                    None => Ok(false),
                }
            };
            let (stdout_truncated, _) = tokio::try_join!(read_out, read_err)?;

            let status = child.wait().await?;
            Ok::<_, std::io::Error>((stdout_buf, stdout_truncated, stderr_buf, status))
        })
        .await;

        let (stdout_buf, stdout_truncated, stderr_buf, status) = match result {
            Ok(Ok(captured)) => captured,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                // Dropping the child with kill_on_drop reaps the process.
                warn!(path = %package_path.display(), "build timed out, killing compiler");
                return Err(ForgeError::BuildTimeout(timeout));
            }
        };

        let stdout_text = String::from_utf8_lossy(&stdout_buf);
        let stderr_text = String::from_utf8_lossy(&stderr_buf);

        if !stderr_text.trim().is_empty() {
            warn!(path = %package_path.display(), stderr = %stderr_text.trim(), "compiler stderr");
        }

        if !status.success() {
            return Err(ForgeError::BuildFailed {
                code: status.code().unwrap_or(-1),
                stderr: stderr_text.trim().to_string(),
            });
        }

        if stdout_truncated {
            return Err(ForgeError::BuildOutputMalformed(format!(
                "output exceeds {MAX_OUTPUT_BYTES} bytes"
            )));
        }

        let output = parse_build_output(&stdout_text)?;
        info!(
            path = %package_path.display(),
            modules = output.modules.len(),
            dependencies = output.dependencies.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "build succeeded"
        );
        Ok(output)
    }
}

/// Read `reader` to the end, keeping at most [`MAX_OUTPUT_BYTES`].
///
/// The excess is read and dropped so the child never blocks on a full pipe.
/// Returns whether anything was dropped.
async fn read_capped<R>(reader: &mut R, buf: &mut Vec<u8>) -> std::io::Result<bool>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 8192];
    let mut truncated = false;
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(truncated);
        }
        let room = MAX_OUTPUT_BYTES.saturating_sub(buf.len());
        if n > room {
            truncated = true;
        }
        buf.extend_from_slice(&chunk[..n.min(room)]);
    }
}

// ---------------------------------------------------------------------------
// Output decoding
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawBuildOutput {
    modules: Vec<String>,
    dependencies: Vec<String>,
    #[serde(default)]
    digest: Option<RawDigest>,
}

/// Older toolchains print the digest as a string, newer ones as a byte array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawDigest {
    Text(String),
    Bytes(Vec<u8>),
}

/// Decode compiler stdout into a [`BuildOutput`].
///
/// The whole output must be one JSON object; if the toolchain printed
/// diagnostics first, the last line that is a JSON object is used instead.
/// Every module must be valid base64 and at least one module is required.
pub fn parse_build_output(stdout: &str) -> Result<BuildOutput, ForgeError> {
    let raw: RawBuildOutput = match serde_json::from_str(stdout.trim()) {
        Ok(raw) => raw,
        Err(whole_err) => {
            let candidate = stdout
                .lines()
                .rev()
                .map(str::trim)
                .find(|line| line.starts_with('{'))
                .ok_or_else(|| ForgeError::BuildOutputMalformed(whole_err.to_string()))?;
            debug!("build output mixed with diagnostics, decoding last JSON line");
            serde_json::from_str(candidate)
                .map_err(|e| ForgeError::BuildOutputMalformed(e.to_string()))?
        }
    };

    if raw.modules.is_empty() {
        return Err(ForgeError::BuildOutputMalformed(
            "build produced no modules".into(),
        ));
    }
    for (index, module) in raw.modules.iter().enumerate() {
        if BASE64.decode(module).is_err() {
            return Err(ForgeError::BuildOutputMalformed(format!(
                "module #{index} is not valid base64"
            )));
        }
    }

    let digest = raw.digest.map(|d| match d {
        RawDigest::Text(text) => text,
        RawDigest::Bytes(bytes) => hex::encode(bytes),
    });

    Ok(BuildOutput {
        modules: raw.modules,
        dependencies: raw.dependencies,
        digest,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
