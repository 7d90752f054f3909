// Checkpoint download helper.
//
// Fetches the three artefacts the classifier path needs from HuggingFace:
// the SentencePiece model, the checkpoint config (kept for assertions), and
// the exported ONNX graph. Files land in a platform-appropriate directory
// (~/.local/share/palisade/models/ on Linux) so they persist across runs.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use crate::config::ScannerConfig;

/// Artefact names inside the cache directory.
pub const SPM_FILE: &str = "spm.model";
pub const ONNX_FILE: &str = "model.onnx";
pub const CONFIG_FILE: &str = "config.json";

/// Repo-relative path of the SentencePiece model.
const SPM_REMOTE: &str = "spm.model";
const CONFIG_REMOTE: &str = "config.json";

/// Returns the default directory for storing model files.
pub fn default_model_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("palisade")
        .join("models")
}

/// Check whether both files the classifier path needs exist.
pub fn model_files_present(dir: &Path) -> bool {
    dir.join(SPM_FILE).exists() && dir.join(ONNX_FILE).exists()
}

/// Check whether the tokenizer can run from this directory.
pub fn spm_file_present(dir: &Path) -> bool {
    dir.join(SPM_FILE).exists()
}

/// Download the checkpoint artefacts into `dir`, skipping files that already
/// exist. The repo, revision, and graph filename come from the config.
pub async fn download_model(dir: &Path, config: &ScannerConfig) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create model directory: {}", dir.display()))?;

    let base = format!(
        "https://huggingface.co/{}/resolve/{}",
        config.onnx_repo, config.onnx_revision
    );

    println!("\nPrompt-injection checkpoint ({}):", config.onnx_repo);

    let targets = [
        (SPM_REMOTE.to_string(), dir.join(SPM_FILE), false),
        (CONFIG_REMOTE.to_string(), dir.join(CONFIG_FILE), false),
        (config.onnx_filename.clone(), dir.join(ONNX_FILE), true),
    ];

    for (remote, dest, large) in targets {
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| remote.clone());
        if dest.exists() {
            info!(file = %name, "artefact already exists, skipping");
            println!("  {name} (already exists)");
            continue;
        }
        if large {
            println!("  Downloading {name} (this is the big one)...");
        } else {
            println!("  Downloading {name}...");
        }
        download_file(&format!("{base}/{remote}"), &dest, large).await?;
    }

    Ok(())
}

/// Download a single file from a URL to a local path.
/// If `show_progress` is true, display a progress bar.
async fn download_file(url: &str, dest: &Path, show_progress: bool) -> Result<()> {
    let client = reqwest::Client::new();
    let response = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("Failed to download {url}"))?;

    if !response.status().is_success() {
        anyhow::bail!("Download failed with status {}: {}", response.status(), url);
    }

    let pb = if show_progress {
        let pb = match response.content_length() {
            Some(size) => {
                let pb = ProgressBar::new(size);
                pb.set_style(
                    ProgressStyle::default_bar()
                        .template("    [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
                        .expect("valid template")
                        .progress_chars("=> "),
                );
                pb
            }
            None => {
                let pb = ProgressBar::new_spinner();
                pb.set_style(
                    ProgressStyle::default_spinner()
                        .template("    {spinner} {bytes}")
                        .expect("valid template"),
                );
                pb
            }
        };
        Some(pb)
    } else {
        None
    };

    let bytes = response
        .bytes()
        .await
        .context("Failed to read response body")?;

    if let Some(ref pb) = pb {
        pb.set_position(bytes.len() as u64);
    }

    std::fs::write(dest, &bytes).with_context(|| format!("Failed to write {}", dest.display()))?;

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    info!("Downloaded {} to {}", url, dest.display());
    Ok(())
}
