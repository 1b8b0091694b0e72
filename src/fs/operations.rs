use std::{
    ffi::OsString,
    path::{Path, PathBuf},
};

use tokio::{
    fs::{self, File},
    io::{self, AsyncWriteExt},
};

/// Temporary sibling used while replacing `path`. Living in the same directory keeps the final
/// rename on one filesystem, which is what makes it atomic.
pub fn temporary_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    name.push(path.file_name().unwrap_or_default());
    name.push(".tmp");
    path.with_file_name(name)
}

/// Replaces the contents of `path` with `contents` so that readers either see the previous file or
/// the new one, never a partial write.
pub async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), io::Error> {
    let temporary = temporary_path(path);

    let result = async {
        let mut file = File::create(&temporary).await?;
        file.write_all(contents).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(&temporary, path).await
    }
    .await;

    if result.is_err() {
        // Leftover temporary files are harmless but confusing for anyone inspecting the directory.
        let _ = fs::remove_file(&temporary).await;
    }
    result
}

/// Moves `path` aside as `<stem>.corrupt-<stamp>.<extension>` and returns the new location.
pub async fn quarantine(path: &Path, stamp: &str) -> Result<PathBuf, io::Error> {
    let stem = path
        .file_stem()
        .map(|v| v.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut name = format!("{stem}.corrupt-{stamp}");
    if let Some(extension) = path.extension() {
        name.push('.');
        name.push_str(&extension.to_string_lossy());
    }
    let target = path.with_file_name(name);
    fs::rename(path, &target).await?;
    Ok(target)
}
