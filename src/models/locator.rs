use crate::error::{PipelineError, Result};

/// Where the source media lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaLocator {
    /// Directly downloadable URL
    Url(String),
    /// Object-store location that needs a short-lived signed URL
    Object { bucket: String, path: String },
}

impl MediaLocator {
    /// Parse `http(s)://...` or `gs://bucket/path`
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();

        if let Some(rest) = raw.strip_prefix("gs://") {
            let (bucket, path) = rest
                .split_once('/')
                .ok_or_else(|| PipelineError::fetch(format!("Missing object path in {}", raw)))?;
            if bucket.is_empty() || path.is_empty() {
                return Err(PipelineError::fetch(format!("Invalid object locator: {}", raw)));
            }
            return Ok(MediaLocator::Object {
                bucket: bucket.to_string(),
                path: path.to_string(),
            });
        }

        if raw.starts_with("http://") || raw.starts_with("https://") {
            return Ok(MediaLocator::Url(raw.to_string()));
        }

        Err(PipelineError::fetch(format!("Unsupported media locator: {}", raw)))
    }

    /// Last path component of the media, without query or fragment
    pub fn file_name(&self) -> String {
        let path = match self {
            MediaLocator::Url(url) => url.split(['?', '#']).next().unwrap_or_default(),
            MediaLocator::Object { path, .. } => path.as_str(),
        };

        let path = path
            .strip_prefix("http://")
            .or_else(|| path.strip_prefix("https://"))
            .map(|rest| rest.split_once('/').map(|(_, p)| p).unwrap_or_default())
            .unwrap_or(path);

        path.rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("media")
            .to_string()
    }
}

impl std::fmt::Display for MediaLocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Query strings can carry credentials
            MediaLocator::Url(url) => f.write_str(url.split('?').next().unwrap_or_default()),
            MediaLocator::Object { bucket, path } => write!(f, "gs://{}/{}", bucket, path),
        }
    }
}
