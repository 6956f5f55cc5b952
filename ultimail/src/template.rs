//! Template directory loading and variable composition.
//!
//! A template directory holds up to four files:
//!
//! ```text
//! welcome/
//!   body.html     (html body, one of html/text required)
//!   body.txt      (plain body, one of html/text required)
//!   subject.txt   (optional)
//!   styles.css    (optional)
//! ```

use serde_json::{Map, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use crate::{MailError, MailOptions, Result};

/// HTML body file name.
pub const HTML_BODY_FILE: &str = "body.html";
/// Plain text body file name.
pub const PLAIN_BODY_FILE: &str = "body.txt";
/// Subject file name.
pub const SUBJECT_FILE: &str = "subject.txt";
/// Stylesheet file name.
pub const STYLES_FILE: &str = "styles.css";

/// Raw contents of one template directory.
///
/// Absent optional files are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateBundle {
    /// Directory the bundle was loaded from.
    pub path: PathBuf,
    pub html_body: String,
    pub plain_body: String,
    pub subject: String,
    pub css: String,
}

impl TemplateBundle {
    /// Build a bundle from in-memory sources.
    pub fn new(
        path: impl Into<PathBuf>,
        html_body: impl Into<String>,
        plain_body: impl Into<String>,
        subject: impl Into<String>,
        css: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            html_body: html_body.into(),
            plain_body: plain_body.into(),
            subject: subject.into(),
            css: css.into(),
        }
    }

    /// Identity of one file in this bundle, used in render errors.
    pub fn identity(&self, file: &str) -> String {
        self.path.join(file).display().to_string()
    }

    fn has_body(&self) -> bool {
        !self.html_body.is_empty() || !self.plain_body.is_empty()
    }
}

/// Resolve a template reference against the current working directory.
///
/// Absolute paths pass through, relative paths are joined onto the working
/// directory, and an empty reference means "not provided". Fails with
/// [`MailError::TemplateLoad`] when a relative path is given and the working
/// directory cannot be determined.
pub fn resolve_template_path(input: Option<&Path>) -> Result<Option<PathBuf>> {
    resolve_against(input, std::env::current_dir)
}

fn resolve_against(
    input: Option<&Path>,
    cwd: impl FnOnce() -> std::io::Result<PathBuf>,
) -> Result<Option<PathBuf>> {
    let Some(input) = input.filter(|p| !p.as_os_str().is_empty()) else {
        return Ok(None);
    };
    if input.is_absolute() {
        return Ok(Some(input.to_path_buf()));
    }
    let cwd = cwd().map_err(|e| MailError::load(input, e))?;
    Ok(Some(cwd.join(input)))
}

/// Load the template files in `dir`.
///
/// Returns `Ok(None)` without touching the filesystem when no directory is
/// given. The four files are read concurrently; a missing file leaves its
/// slot empty, any other read failure is fatal. Fails with
/// [`MailError::NoBodyContent`] when neither body file has content.
pub async fn load_template(dir: Option<&Path>) -> Result<Option<TemplateBundle>> {
    let Some(dir) = dir else {
        trace!("No template directory given, skipping load");
        return Ok(None);
    };

    let (html_body, plain_body, subject, css) = tokio::try_join!(
        read_optional(dir.join(HTML_BODY_FILE)),
        read_optional(dir.join(PLAIN_BODY_FILE)),
        read_optional(dir.join(SUBJECT_FILE)),
        read_optional(dir.join(STYLES_FILE)),
    )?;

    let bundle = TemplateBundle::new(dir, html_body, plain_body, subject, css);

    if !bundle.has_body() {
        return Err(MailError::NoBodyContent(dir.to_path_buf()));
    }

    debug!(
        template = %dir.display(),
        html = !bundle.html_body.is_empty(),
        text = !bundle.plain_body.is_empty(),
        css = !bundle.css.is_empty(),
        "Loaded email template"
    );

    Ok(Some(bundle))
}

async fn read_optional(path: PathBuf) -> Result<String> {
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => Ok(contents),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(MailError::load(path, err)),
    }
}

/// Build the variable namespace for rendering.
///
/// Layers, lowest precedence first: the effective options, the options'
/// `variables` map, then `extra` values computed for this call.
pub fn compose_variables(options: &MailOptions, extra: Option<Map<String, Value>>) -> Result<Value> {
    let mut variables = options.to_variables()?;

    if let Some(user) = &options.variables {
        variables.extend(user.iter().map(|(k, v)| (k.clone(), v.clone())));
    }
    if let Some(extra) = extra {
        variables.extend(extra);
    }

    Ok(Value::Object(variables))
}
