//! Firmware Registry & OTA Trigger (C11): content-addressed firmware store
//! and OTA command emission, per spec §4.11.

use std::path::PathBuf;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::fs;

use crate::commands::Dispatcher;
use crate::config::FirmwareConfig;
use crate::db::firmware::FirmwareRelease;
use crate::db::Database;
use crate::errors::{CoreError, CoreResult};

pub struct FirmwareRegistry {
    db: Arc<Database>,
    dispatcher: Dispatcher,
    upload_dir: PathBuf,
}

impl FirmwareRegistry {
    pub fn new(db: Arc<Database>, dispatcher: Dispatcher, config: &FirmwareConfig) -> Self {
        Self {
            db,
            dispatcher,
            upload_dir: PathBuf::from(&config.upload_dir),
        }
    }

    /// Compute the SHA-256 over `binary`, reject if `version` already
    /// exists, write to a content-addressed path, and record the release.
    pub async fn upload(
        &self,
        version: &str,
        filename: &str,
        binary: &[u8],
        notes: Option<&str>,
        uploader_id: Option<i64>,
    ) -> CoreResult<FirmwareRelease> {
        if self.db.get_firmware_by_version(version).await?.is_some() {
            return Err(CoreError::Conflict(format!(
                "firmware version {version} already exists"
            )));
        }

        let mut hasher = Sha256::new();
        hasher.update(binary);
        let sha256 = hex::encode(hasher.finalize());

        fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(|e| CoreError::InternalError(format!("failed to create upload dir: {e}")))?;

        let path = self.upload_dir.join(&sha256);
        fs::write(&path, binary)
            .await
            .map_err(|e| CoreError::InternalError(format!("failed to write firmware binary: {e}")))?;

        self.db
            .insert_firmware_release(
                version,
                filename,
                &path.to_string_lossy(),
                binary.len() as i64,
                &sha256,
                notes,
                uploader_id,
            )
            .await
    }

    pub async fn latest(&self) -> CoreResult<FirmwareRelease> {
        self.db.get_latest_firmware().await
    }

    pub async fn list(&self) -> CoreResult<Vec<FirmwareRelease>> {
        self.db.list_firmware_releases().await
    }

    /// Ask C7 to publish `UPDATE_FIRMWARE` with the download URL; the
    /// device pulls the binary and verifies the checksum itself (the
    /// checksum is exposed in the `latest` response for that purpose).
    pub async fn trigger_ota(
        &self,
        device_id: &str,
        tenant_id: i64,
        download_base_url: &str,
    ) -> CoreResult<()> {
        let release = self.latest().await?;
        let url = format!("{download_base_url}/firmware/{}/download", release.version);
        self.dispatcher
            .send(
                device_id,
                tenant_id,
                "UPDATE_FIRMWARE",
                None,
                Some(serde_json::json!({ "url": url, "sha256": release.sha256 })),
                None,
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    #[test]
    fn sha256_is_deterministic_over_content() {
        let mut h1 = Sha256::new();
        h1.update(b"firmware-bytes");
        let mut h2 = Sha256::new();
        h2.update(b"firmware-bytes");
        assert_eq!(hex::encode(h1.finalize()), hex::encode(h2.finalize()));
    }
}
