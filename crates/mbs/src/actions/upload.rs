//! `upload` -- send ebook files to the server, then ask the pub/sub side
//! to extract their metadata.

use std::path::{Path, PathBuf};

use clap::ArgMatches;
use mbs_api::Body;
use mbs_api::wamp::Dict;
use mbs_core::{Action, ActionContext, CoreError};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::print_json;

/// Multipart upload endpoint.
pub const UPLOAD_PATH: &str = "/api/upload";

/// Multipart form field carrying the file.
pub const FILE_FIELD: &str = "file";

/// Procedure that extracts metadata from an uploaded file.
pub const METADATA_PROCEDURE: &str = "metadata_extract";

pub struct Upload {
    files: Vec<PathBuf>,
    extract_meta: bool,
}

pub fn build(matches: &ArgMatches) -> Result<Box<dyn Action>, CoreError> {
    let files: Vec<PathBuf> = matches
        .get_many::<PathBuf>("files")
        .map(|paths| paths.cloned().collect())
        .unwrap_or_default();
    if files.is_empty() {
        return Err(CoreError::InvalidInput {
            message: "no files to upload".into(),
        });
    }
    Ok(Box::new(Upload {
        files,
        extract_meta: !matches.get_flag("no-meta"),
    }))
}

impl Upload {
    fn upload_one(&self, ctx: &ActionContext<'_>, path: &Path) -> Result<Value, CoreError> {
        let bytes = std::fs::read(path).map_err(|e| CoreError::InvalidInput {
            message: format!("cannot read {}: {e}", path.display()),
        })?;
        let file_name = path
            .file_name()
            .map_or_else(|| "upload".into(), |n| n.to_string_lossy().into_owned());

        info!(file = %path.display(), bytes = bytes.len(), "Uploading");
        let response = ctx.http.post(
            UPLOAD_PATH,
            &Body::File {
                field: FILE_FIELD.into(),
                file_name,
                bytes,
            },
        )?;

        let id = response
            .get(FILE_FIELD)
            .filter(|id| !id.is_null())
            .cloned()
            .ok_or_else(|| CoreError::Api {
                error: "upload response has no file id".into(),
                details: Some(response.to_string()),
            })?;
        debug!(%id, "uploaded");

        if !self.extract_meta {
            return Ok(json!({ FILE_FIELD: id }));
        }
        Ok(ctx.pubsub.call(METADATA_PROCEDURE, vec![id], Dict::new())?)
    }
}

impl Action for Upload {
    fn run(&mut self, ctx: &ActionContext<'_>) -> Result<(), CoreError> {
        for path in &self.files {
            if ctx.interrupt.is_raised() {
                return Err(CoreError::Interrupted);
            }
            let result = self.upload_one(ctx, path)?;
            print_json(&result)?;
        }
        Ok(())
    }
}
