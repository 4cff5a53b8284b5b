use axum::{
    http::header::{CONTENT_DISPOSITION, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use diesel::PgConnection;
use tracing::{info, warn};
use uuid::Uuid;

use crate::accounts::Accounts;
use crate::applications::Applications;
use crate::catalog::JobCatalog;
use crate::error::{AppError, AppResult, ErrorKind};
use crate::storage::ArtifactStore;

const FALLBACK_APPLICANT_NAME: &str = "applicant";

/// Reduces a client-supplied filename to a single safe path component.
pub fn sanitize_filename(raw: &str) -> Option<String> {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = last
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .trim()
        .to_string();

    match cleaned.as_str() {
        "" | "." | ".." => None,
        _ => Some(cleaned),
    }
}

/// `{job_id}/{application_id}/{freelancer_id}_{filename}`.
///
/// The application id keeps two attempts by the same freelancer from ever
/// writing to the same file.
pub fn artifact_key(
    job_id: Uuid,
    application_id: Uuid,
    freelancer_id: Uuid,
    filename: &str,
) -> String {
    format!("{job_id}/{application_id}/{freelancer_id}_{filename}")
}

/// Name offered to the employer: the stored file name without its
/// `{freelancer_id}_` prefix, prefixed with the freelancer's name instead.
pub fn download_name(resume_path: &str, freelancer_name: &str) -> String {
    let file = resume_path.rsplit('/').next().unwrap_or(resume_path);
    let original = file.split_once('_').map(|(_, rest)| rest).unwrap_or(file);
    format!("{}_{}", freelancer_name.trim(), original)
}

fn attachment_content_disposition(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if ch.is_control() => '_',
            _ => ch,
        })
        .collect();
    let ascii: String = sanitized
        .chars()
        .map(|ch| if ch.is_ascii() { ch } else { '_' })
        .collect();

    let encoded =
        percent_encoding::utf8_percent_encode(&sanitized, percent_encoding::NON_ALPHANUMERIC);
    format!("attachment; filename=\"{ascii}\"; filename*=UTF-8''{encoded}")
}

#[derive(Debug)]
pub struct Resume {
    pub bytes: Vec<u8>,
    pub download_name: String,
    pub content_type: String,
}

impl IntoResponse for Resume {
    fn into_response(self) -> Response {
        (
            [
                (CONTENT_TYPE, self.content_type),
                (
                    CONTENT_DISPOSITION,
                    attachment_content_disposition(&self.download_name),
                ),
            ],
            self.bytes,
        )
            .into_response()
    }
}

/// Loads the resume of `application_id` for `employer_id`, who must own the
/// job the application was made to.
pub async fn retrieve(
    conn: &mut PgConnection,
    artifacts: &dyn ArtifactStore,
    application_id: Uuid,
    employer_id: Uuid,
) -> AppResult<Resume> {
    let application = Applications::new(conn)
        .find(application_id)?
        .ok_or_else(AppError::not_found)?;

    let owned = JobCatalog::new(conn)
        .find(application.job_id)?
        .is_some_and(|job| job.employer_id == employer_id);
    if !owned {
        warn!(
            application_id = %application_id,
            employer_id = %employer_id,
            "resume download denied"
        );
        return Err(AppError::new(
            ErrorKind::Unauthorized,
            "you are not allowed to download this resume",
        ));
    }

    let freelancer_name = Accounts::new(conn)
        .find(application.freelancer_id)?
        .map(|user| user.name)
        .unwrap_or_else(|| FALLBACK_APPLICANT_NAME.to_string());

    let bytes = artifacts
        .get(&application.resume_path)
        .await?
        .ok_or_else(|| {
            warn!(
                application_id = %application_id,
                resume_path = %application.resume_path,
                "resume file missing from storage"
            );
            AppError::new(ErrorKind::ArtifactNotFound, "resume file not found")
        })?;

    let download_name = download_name(&application.resume_path, &freelancer_name);
    let content_type = mime_guess::from_path(&download_name)
        .first_or_octet_stream()
        .to_string();

    info!(application_id = %application_id, size_bytes = bytes.len(), "serving resume");

    Ok(Resume {
        bytes,
        download_name,
        content_type,
    })
}
