use crate::error::{RctfError, Result};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

const FALLBACK_EDITORS: [&str; 2] = ["/usr/bin/vim", "/usr/bin/nano"];

/// An editor command line: resolved program plus any arguments from `$EDITOR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Editor {
    pub program: PathBuf,
    pub args: Vec<String>,
}

/// `$EDITOR` when it resolves to an executable, else the first installed fallback editor.
pub fn find_editor() -> Result<Editor> {
    find_editor_from(std::env::var("EDITOR").ok().as_deref(), &FALLBACK_EDITORS)
}

fn find_editor_from(configured: Option<&str>, fallbacks: &[&str]) -> Result<Editor> {
    if let Some(line) = configured {
        let mut parts = line.split_whitespace();
        if let Some(program) = parts.next() {
            match which::which(program) {
                Ok(program) => {
                    return Ok(Editor {
                        program,
                        args: parts.map(str::to_string).collect(),
                    })
                }
                Err(e) => debug!("$EDITOR {program} is not usable: {e}"),
            }
        }
    }

    fallbacks
        .iter()
        .map(Path::new)
        .find(|p| p.is_file())
        .map(|p| Editor {
            program: p.to_path_buf(),
            args: Vec::new(),
        })
        .ok_or(RctfError::EditorNotFound)
}

/// Open `path` in `editor` attached to the user's terminal and wait for it to exit.
pub async fn edit_file(editor: &Editor, path: &Path) -> Result<()> {
    debug!("Opening {} with {}", path.display(), editor.program.display());
    let status = Command::new(&editor.program)
        .args(&editor.args)
        .arg(path)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await?;

    if !status.success() {
        return Err(RctfError::SubprocessFailure {
            command: format!("{} {}", editor.program.display(), path.display()),
            code: status.code().unwrap_or(1),
        });
    }
    Ok(())
}
