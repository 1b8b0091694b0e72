use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::fs::operations::write_atomically;

use super::stats::read_history;

#[derive(Debug, clap::Args)]
pub struct ExportCommand {
    #[arg(
        short,
        long,
        help = "Write the export into a file instead of printing it"
    )]
    output: Option<PathBuf>,
}

/// Prints the whole history in the same format the daemon stores it in.
pub async fn process_export_command(app_dir: &Path, command: ExportCommand) -> Result<()> {
    let history = read_history(app_dir).await?;
    let mut json = serde_json::to_vec_pretty(&history)?;
    json.push(b'\n');

    match command.output {
        Some(output) => write_atomically(&output, &json).await?,
        None => print!("{}", String::from_utf8_lossy(&json)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use anyhow::Result;
    use tempfile::tempdir;

    use crate::daemon::storage::history_storage::HISTORY_FILE_NAME;

    use super::{process_export_command, ExportCommand};

    #[tokio::test]
    async fn test_export_matches_stored_history() -> Result<()> {
        let dir = tempdir()?;
        let stored = "{\n  \"2025-03-01\": {\n    \"keystrokesCount\": 10,\n    \"mouseClicksCount\": 2\n  }\n}\n";
        fs::write(dir.path().join(HISTORY_FILE_NAME), stored)?;
        let output = dir.path().join("export.json");

        process_export_command(
            dir.path(),
            ExportCommand {
                output: Some(output.clone()),
            },
        )
        .await?;

        assert_eq!(fs::read_to_string(output)?, stored);
        Ok(())
    }
}
