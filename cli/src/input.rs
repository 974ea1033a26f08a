use std::path::PathBuf;

use quill_core::api::{normalized_prompt, CliError};

use crate::commands::cli::Args;

/// What to continue and where the continuation goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInput {
    pub text: String,
    /// Set in append mode: the file the text came from.
    pub append_to: Option<PathBuf>,
}

/// Resolve the prompt before any model resource is touched. In append mode
/// the text is returned as it will read after the file's trailing newline
/// is normalized, so the seam check sees the real last character.
pub async fn load_input(args: &Args) -> Result<RunInput, CliError> {
    if let Some(prompt) = &args.prompt {
        return Ok(RunInput {
            text: prompt.clone(),
            append_to: None,
        });
    }

    let Some(path) = &args.file else {
        return Err(CliError::Input(
            "nothing to continue: pass --prompt <TEXT> or --file <PATH>".into(),
        ));
    };

    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| CliError::Input(format!("cannot read {}: {e}", path.display())))?;
    tracing::debug!(path = %path.display(), bytes = text.len(), append = args.append, "input loaded");

    if args.append {
        Ok(RunInput {
            text: normalized_prompt(&text).to_string(),
            append_to: Some(path.clone()),
        })
    } else {
        Ok(RunInput {
            text,
            append_to: None,
        })
    }
}
