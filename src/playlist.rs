use std::{
    fmt::Write as _,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use tokio::{fs::File, io::AsyncWriteExt};
use tracing::{info, warn};

use crate::structs::ResolutionResult;

/// One line pair of the output channel list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelListEntry {
    pub title: String,
    pub stream_url: String,
    pub display_date: NaiveDate,
}

/// Entries for the resolved results, in result order. Unresolved events are dropped.
#[must_use]
pub fn entries(results: &[ResolutionResult], date: NaiveDate) -> Vec<ChannelListEntry> {
    results
        .iter()
        .filter_map(|r| {
            r.stream_url.as_ref().map(|url| ChannelListEntry {
                title: r.event.title.clone(),
                stream_url: url.clone(),
                display_date: date,
            })
        })
        .collect()
}

#[must_use]
pub fn render(entries: &[ChannelListEntry]) -> String {
    let mut out = String::from("#EXTM3U\n");
    for entry in entries {
        // Writing to a String never fails
        let _ = write!(
            out,
            "#EXTINF:-1,{} - {}\n{}\n",
            entry.display_date.format("%d/%m"),
            entry.title.split_whitespace().collect::<Vec<_>>().join(" "),
            entry.stream_url.trim()
        );
    }
    out
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes the channel list to `path`, replacing any previous one in a single rename.
///
/// With no entries nothing is written and the previous file stays as it was.
/// Returns whether a file was written.
///
/// # Errors
/// Errors when the temporary file cannot be written or renamed into place
pub async fn write_channel_list(path: &Path, entries: &[ChannelListEntry]) -> Result<bool> {
    if entries.is_empty() {
        warn!("No stream resolved, leaving {} untouched", path.display());
        return Ok(false);
    }

    let tmp = temp_path(path);
    let mut file = File::create(&tmp)
        .await
        .with_context(|| format!("Creating {}", tmp.display()))?;
    file.write_all(render(entries).as_bytes())
        .await
        .context("Writing channel list")?;
    file.sync_all().await.context("Flushing channel list")?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("Moving channel list into {}", path.display()))?;

    info!("Wrote {} entries to {}", entries.len(), path.display());
    Ok(true)
}

/// Fails early when the output directory is missing or read-only
///
/// # Errors
/// Errors when `path`'s directory does not exist or cannot be written to
pub async fn ensure_writable(path: &Path) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let meta = match tokio::fs::metadata(&dir).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            bail!("Output directory {} does not exist", dir.display());
        }
        Err(e) => return Err(e).context("Checking output directory"),
    };

    if !meta.is_dir() {
        bail!("{} is not a directory", dir.display());
    }
    if meta.permissions().readonly() {
        bail!("Output directory {} is read-only", dir.display());
    }

    Ok(())
}
