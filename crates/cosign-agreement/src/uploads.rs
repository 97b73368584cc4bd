use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::{info, warn};

use cosign_core::error::{CosignError, Result};
use cosign_core::types::{AgreementId, Vote};

use crate::record::remove_file_quietly;
use crate::registry::{lock, StateRegistry};

/// Identity material uploaded by one party. Either image may be absent.
#[derive(Debug, Clone, Default)]
pub struct IdentityUpload {
    /// Base64 photo, optionally as a `data:image/...;base64,` URL.
    pub photo: Option<String>,
    /// Base64 signature image, same encoding rules.
    pub signature: Option<String>,
}

/// Writes uploaded identity images into the owning record's temp dir.
pub struct IdentityUploads {
    registry: Arc<StateRegistry>,
}

#[derive(Clone, Copy)]
enum ImageKind {
    Photo,
    Signature,
}

impl ImageKind {
    fn stem(self) -> &'static str {
        match self {
            Self::Photo => "photo",
            Self::Signature => "signature",
        }
    }
}

/// Decoded image bytes plus the file extension implied by its media type.
struct DecodedImage {
    bytes: Vec<u8>,
    extension: &'static str,
}

fn decode_image(payload: &str) -> Result<DecodedImage> {
    let payload = payload.trim();
    let (media_type, data) = match payload.strip_prefix("data:") {
        Some(rest) => {
            let (header, data) = rest
                .split_once(',')
                .ok_or_else(|| CosignError::InvalidImage("data URL without payload".into()))?;
            (header.split(';').next().unwrap_or_default(), data)
        }
        None => ("", payload),
    };
    let extension = match media_type {
        "image/jpeg" | "image/jpg" => "jpeg",
        "image/webp" => "webp",
        _ => "png",
    };
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| CosignError::InvalidImage(e.to_string()))?;
    if bytes.is_empty() {
        return Err(CosignError::InvalidImage("empty image".into()));
    }
    Ok(DecodedImage { bytes, extension })
}

impl IdentityUploads {
    pub fn new(registry: Arc<StateRegistry>) -> Self {
        Self { registry }
    }

    /// Store the party's images and point the record at them.
    ///
    /// Repeated uploads replace earlier ones; the record always reflects the
    /// most recent write.
    pub async fn attach(&self, party_id: &str, upload: IdentityUpload) -> Result<AgreementId> {
        let photo = upload.photo.as_deref().filter(|s| !s.is_empty()).map(decode_image).transpose()?;
        let signature = upload
            .signature
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(decode_image)
            .transpose()?;

        let (agreement_id, record) = self
            .registry
            .find_party(party_id)
            .ok_or_else(|| CosignError::UnknownParty(party_id.to_string()))?;
        let temp_dir = lock(&record).temp_dir.clone().ok_or_else(|| {
            CosignError::UnknownParty(format!("{} (agreement {} not initialised)", party_id, agreement_id))
        })?;

        // The lifecycle owns the dir; a missing dir means the record was cleaned up.
        if !tokio::fs::try_exists(&temp_dir).await.unwrap_or(false) {
            return Err(CosignError::UnknownParty(party_id.to_string()));
        }

        let mut written: Vec<(ImageKind, PathBuf)> = Vec::new();
        for (kind, image) in [(ImageKind::Photo, photo), (ImageKind::Signature, signature)] {
            if let Some(image) = image {
                let path = image_path(&temp_dir, party_id, kind, image.extension);
                if let Err(e) = write_image(&path, &image.bytes).await {
                    for (_, p) in &written {
                        remove_file_quietly(p);
                    }
                    return Err(e);
                }
                written.push((kind, path));
            }
        }

        // The lifecycle may have finished while we were writing.
        let still_live = self
            .registry
            .get(agreement_id)
            .is_some_and(|current| Arc::ptr_eq(&current, &record));
        if !still_live {
            for (_, p) in &written {
                remove_file_quietly(p);
            }
            return Err(CosignError::UnknownParty(party_id.to_string()));
        }

        let mut r = lock(&record);
        let mut replaced = Vec::new();
        let mut signature_after_vote = false;
        if let Some(party) = r.party_mut(party_id) {
            for (kind, path) in &written {
                let slot = match kind {
                    ImageKind::Photo => &mut party.photo_ref,
                    ImageKind::Signature => &mut party.signature_ref,
                };
                if let Some(old) = slot.replace(path.clone()) {
                    if &old != path {
                        replaced.push(old);
                    }
                }
                if matches!(kind, ImageKind::Signature) && party.vote == Vote::Approved {
                    signature_after_vote = true;
                }
            }
        }
        for old in &replaced {
            remove_file_quietly(old);
        }
        for (_, path) in written {
            r.track_temp_file(path);
        }
        drop(r);

        if signature_after_vote {
            warn!(
                agreement_id = %agreement_id,
                party_id,
                "Signature uploaded after the party approved; the latest upload will be used"
            );
        }
        info!(agreement_id = %agreement_id, party_id, "Identity material attached");
        Ok(agreement_id)
    }
}

fn image_path(dir: &Path, party_id: &str, kind: ImageKind, extension: &str) -> PathBuf {
    dir.join(format!("{}-{}.{}", party_id, kind.stem(), extension))
}

/// Never creates directories, so a late upload cannot resurrect a cleaned-up dir.
async fn write_image(path: &Path, bytes: &[u8]) -> Result<()> {
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use cosign_core::types::{ContactDetails, PartyRole};

    use super::*;
    use crate::record::Party;

    const PNG_B64: &str = "iVBORw0KGgo=";

    fn setup(dir: &Path) -> (Arc<StateRegistry>, String) {
        let registry = Arc::new(StateRegistry::new());
        let record = registry.get_or_create(AgreementId(21));
        let party = Party::new(
            PartyRole::Participant,
            "TENANT_1",
            "Tenant",
            &ContactDetails {
                name: "Ben".into(),
                email: "ben@example.com".into(),
            },
        );
        let party_id = party.id.0.clone();
        let mut r = lock(&record);
        std::fs::create_dir_all(dir.join("21")).unwrap();
        r.temp_dir = Some(dir.join("21"));
        r.parties.push(party);
        drop(r);
        (registry, party_id)
    }

    #[test]
    fn decodes_data_urls_and_plain_base64() {
        let jpeg = decode_image(&format!("data:image/jpeg;base64,{}", PNG_B64)).unwrap();
        assert_eq!(jpeg.extension, "jpeg");
        let plain = decode_image(PNG_B64).unwrap();
        assert_eq!(plain.extension, "png");
        assert_eq!(plain.bytes, jpeg.bytes);
        assert!(decode_image("data:image/png;base64").is_err());
        assert!(decode_image("***").is_err());
    }

    #[tokio::test]
    async fn attach_sets_refs_and_tracks_files() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, party_id) = setup(dir.path());
        let uploads = IdentityUploads::new(registry.clone());

        let id = uploads
            .attach(
                &party_id,
                IdentityUpload {
                    photo: Some(PNG_B64.into()),
                    signature: Some(format!("data:image/jpeg;base64,{}", PNG_B64)),
                },
            )
            .await
            .unwrap();
        assert_eq!(id, AgreementId(21));

        let record = registry.get(id).unwrap();
        let r = lock(&record);
        let party = r.party(&party_id).unwrap();
        let photo = party.photo_ref.clone().unwrap();
        let signature = party.signature_ref.clone().unwrap();
        assert!(photo.exists());
        assert!(signature.to_string_lossy().ends_with("-signature.jpeg"));
        assert!(r.temp_files().contains(&photo));
        assert!(r.temp_files().contains(&signature));
    }

    #[tokio::test]
    async fn last_write_wins_and_old_file_is_removed() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, party_id) = setup(dir.path());
        let uploads = IdentityUploads::new(registry.clone());

        uploads
            .attach(
                &party_id,
                IdentityUpload {
                    signature: Some(PNG_B64.into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let first = lock(&registry.get(AgreementId(21)).unwrap())
            .party(&party_id)
            .unwrap()
            .signature_ref
            .clone()
            .unwrap();

        uploads
            .attach(
                &party_id,
                IdentityUpload {
                    signature: Some(format!("data:image/webp;base64,{}", PNG_B64)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let second = lock(&registry.get(AgreementId(21)).unwrap())
            .party(&party_id)
            .unwrap()
            .signature_ref
            .clone()
            .unwrap();

        assert_ne!(first, second);
        assert!(!first.exists());
        assert!(second.exists());
    }

    #[tokio::test]
    async fn unknown_party_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, _) = setup(dir.path());
        let uploads = IdentityUploads::new(registry);
        let err = uploads
            .attach(
                "not-a-party",
                IdentityUpload {
                    photo: Some(PNG_B64.into()),
                    signature: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CosignError::UnknownParty(_)));
    }

    #[tokio::test]
    async fn upload_after_cleanup_does_not_recreate_temp_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (registry, party_id) = setup(dir.path());
        std::fs::remove_dir_all(dir.path().join("21")).unwrap();
        let uploads = IdentityUploads::new(registry.clone());

        let err = uploads
            .attach(
                &party_id,
                IdentityUpload {
                    photo: Some(PNG_B64.into()),
                    signature: Some(PNG_B64.into()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CosignError::UnknownParty(_)));
        assert!(!dir.path().join("21").exists());

        let record = registry.get(AgreementId(21)).unwrap();
        let r = lock(&record);
        assert!(r.parties[0].photo_ref.is_none());
        assert!(r.temp_files().is_empty());
    }
}
