//! Pixelfed API client.
//!
//! Two-step publish workflow: upload the media file, then create a status
//! referencing the returned media id. Carries no retry logic — outcomes are
//! reported back to the queue, which owns all retry and backoff decisions.

use std::path::Path;
use std::time::Duration;

use reqwest::multipart;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::runner::Publisher;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const POST_TIMEOUT: Duration = Duration::from_secs(30);

/// Media object returned by `POST /api/v1/media`.
#[derive(Debug, Deserialize)]
pub struct Media {
    pub id: Option<String>,
}

/// Status object returned by `POST /api/v1/statuses`.
#[derive(Debug, Deserialize)]
pub struct Status {
    pub url: Option<String>,
}

/// Client for a single Pixelfed instance.
pub struct PixelfedClient {
    http: reqwest::Client,
    instance_url: String,
    access_token: SecretString,
    default_caption: String,
    cc_license: String,
}

impl PixelfedClient {
    pub fn new(
        instance_url: impl Into<String>,
        access_token: SecretString,
        default_caption: impl Into<String>,
        cc_license: impl Into<String>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            instance_url: instance_url.into().trim_end_matches('/').to_string(),
            access_token,
            default_caption: default_caption.into(),
            cc_license: cc_license.into(),
        }
    }

    /// Probe the instance endpoint to see whether the remote is reachable.
    pub async fn check_connection(&self) -> Result<()> {
        self.http
            .get(format!("{}/api/v1/instance", self.instance_url))
            .bearer_auth(self.access_token.expose_secret())
            .timeout(CONNECT_TIMEOUT)
            .send()
            .await?
            .error_for_status()?;
        debug!("connection check successful");
        Ok(())
    }

    /// Upload a media file. Returns the media id the instance assigned.
    ///
    /// An accepted upload that comes back without an id is surfaced as a
    /// failure like any other; the queue retries it the same way.
    pub async fn upload_media(&self, file_path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(file_path).await?;
        let file_name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());

        let part = multipart::Part::bytes(bytes)
            .file_name(file_name.clone())
            .mime_str(mime_type(file_path))?;
        let form = multipart::Form::new().part("file", part);

        let media: Media = self
            .http
            .post(format!("{}/api/v1/media", self.instance_url))
            .bearer_auth(self.access_token.expose_secret())
            .timeout(UPLOAD_TIMEOUT)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let id = media
            .id
            .ok_or_else(|| Error::Api(format!("no media id returned for {file_name}")))?;
        info!("uploaded media: {file_name} (id {id})");
        Ok(id)
    }

    /// Create a status referencing previously uploaded media.
    pub async fn create_post(&self, media_ids: &[String], caption: &str) -> Result<Status> {
        let mut params: Vec<(&str, &str)> = vec![("status", caption)];
        for id in media_ids {
            params.push(("media_ids[]", id));
        }

        let status: Status = self
            .http
            .post(format!("{}/api/v1/statuses", self.instance_url))
            .bearer_auth(self.access_token.expose_secret())
            .timeout(POST_TIMEOUT)
            .form(&params)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info!("created post: {}", status.url.as_deref().unwrap_or("<no url>"));
        Ok(status)
    }

    /// Upload a file and immediately create a post with it.
    pub async fn upload_and_post(&self, file_path: &Path, caption: &str) -> Result<()> {
        if !file_path.exists() {
            return Err(Error::Api(format!("file not found: {}", file_path.display())));
        }

        let media_id = self.upload_media(file_path).await?;
        let full_caption = compose_caption(caption, &self.default_caption, &self.cc_license);
        self.create_post(&[media_id], &full_caption).await?;
        Ok(())
    }
}

impl Publisher for PixelfedClient {
    async fn check_connection(&self) -> Result<()> {
        PixelfedClient::check_connection(self).await
    }

    async fn publish(&self, subject: &Path, annotation: &str) -> Result<()> {
        self.upload_and_post(subject, annotation).await
    }
}

/// Join the per-item caption, the instance-wide default text and the
/// license text, skipping whichever parts are empty.
fn compose_caption(caption: &str, default_caption: &str, cc_license: &str) -> String {
    [caption, default_caption, cc_license]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join(" ")
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caption_combines_nonempty_parts() {
        assert_eq!(
            compose_caption("sunset", "#photo", "CC BY-SA 4.0"),
            "sunset #photo CC BY-SA 4.0"
        );
        assert_eq!(compose_caption("", "#photo", ""), "#photo");
        assert_eq!(compose_caption("", "", ""), "");
    }

    #[test]
    fn mime_type_from_extension() {
        assert_eq!(mime_type(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(mime_type(Path::new("a.webp")), "image/webp");
        assert_eq!(mime_type(Path::new("a.bin")), "application/octet-stream");
        assert_eq!(mime_type(Path::new("noext")), "application/octet-stream");
    }
}
