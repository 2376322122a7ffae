//! Object key layout.

use clipai_models::JobId;

use crate::error::{StorageError, StorageResult};

/// Key for a job artefact: `{job_id}/{file_name}`.
pub fn clip_key(job_id: &JobId, file_name: &str) -> StorageResult<String> {
    if job_id.is_empty() || job_id.as_str().contains('/') || job_id.as_str().contains("..") {
        return Err(StorageError::invalid_key(job_id.as_str()));
    }
    if file_name.is_empty() || file_name.contains('/') || file_name == ".." {
        return Err(StorageError::invalid_key(file_name));
    }
    Ok(format!("{}/{}", job_id, file_name))
}

/// Content type by file extension.
pub fn content_type_for(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("mp4") => "video/mp4",
        Some("ass") => "text/x-ssa",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_key() {
        let id = JobId::from_string("abc-123");
        assert_eq!(clip_key(&id, "short_01.mp4").unwrap(), "abc-123/short_01.mp4");
    }

    #[test]
    fn test_clip_key_rejects_traversal() {
        assert!(clip_key(&JobId::from_string("../etc"), "a.mp4").is_err());
        assert!(clip_key(&JobId::from_string("job"), "x/y.mp4").is_err());
        assert!(clip_key(&JobId::from_string(""), "a.mp4").is_err());
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type_for("short_01.mp4"), "video/mp4");
        assert_eq!(content_type_for("short_01.MP4"), "video/mp4");
        assert_eq!(content_type_for("short_01.ass"), "text/x-ssa");
        assert_eq!(content_type_for("blob"), "application/octet-stream");
    }
}
