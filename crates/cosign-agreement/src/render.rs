//! Markdown rendering of agreement text, including signature placeholders.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use regex::Regex;
use tracing::warn;

use cosign_core::error::{CosignError, Result};

/// Blank line printed where no signature image is available.
const SIGNATURE_LINE: &str = "______________________________";

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\[[A-Z0-9_]+_SIGNATURE\]").expect("static regex"))
}

/// One signature slot: the party's placeholder, label, and display name.
#[derive(Debug, Clone)]
pub struct SignatureSlot {
    pub placeholder: String,
    pub label: String,
    pub name: String,
    pub signature: Option<PathBuf>,
}

/// Normalise characters the downstream renderers choke on.
pub fn normalize(text: &str) -> String {
    text.replace('₹', "Rs.").replace("â‚¹", "Rs.")
}

/// Append a signature block for any slot whose placeholder the draft lacks.
pub fn ensure_signature_block(text: &str, slots: &[SignatureSlot]) -> String {
    let missing: Vec<&SignatureSlot> = slots
        .iter()
        .filter(|s| !text.contains(&s.placeholder))
        .collect();
    if missing.is_empty() {
        return text.to_string();
    }

    let mut out = text.trim_end().to_string();
    out.push_str("\n\n## Signatures\n");
    for slot in missing {
        out.push_str(&format!(
            "\n**{}: {}**\n\n{}\n",
            slot.label, slot.name, slot.placeholder
        ));
    }
    out
}

/// Inline an image file as a `data:` URI so the document outlives the file.
fn image_data_uri(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let media_type = match path.extension().and_then(|e| e.to_str()) {
        Some("jpeg") | Some("jpg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    };
    Ok(format!("data:{};base64,{}", media_type, STANDARD.encode(bytes)))
}

/// Replace each placeholder with its embedded signature image, or a blank line.
/// Placeholders that belong to no party are blanked too. Blocking: reads the
/// signature files.
pub fn substitute_signatures(text: &str, slots: &[SignatureSlot]) -> String {
    let mut out = text.to_string();
    for slot in slots {
        let embedded = slot.signature.as_deref().and_then(|path| match image_data_uri(path) {
            Ok(uri) => Some(uri),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Signature image unreadable, leaving a blank line");
                None
            }
        });
        let replacement = match embedded {
            Some(uri) => format!("![{} signature]({})", slot.label, uri),
            None => SIGNATURE_LINE.to_string(),
        };
        out = out.replace(&slot.placeholder, &replacement);
    }
    placeholder_pattern()
        .replace_all(&out, SIGNATURE_LINE)
        .into_owned()
}

/// Write `content` to `path`, creating the parent directory.
pub fn write_document(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| CosignError::Render(format!("create {}: {}", parent.display(), e)))?;
    }
    std::fs::write(path, content)
        .map_err(|e| CosignError::Render(format!("write {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(placeholder: &str, signature: Option<&str>) -> SignatureSlot {
        SignatureSlot {
            placeholder: placeholder.to_string(),
            label: "Owner".to_string(),
            name: "Asha".to_string(),
            signature: signature.map(PathBuf::from),
        }
    }

    #[test]
    fn rupee_symbol_is_spelled_out() {
        assert_eq!(normalize("Rent: ₹25000"), "Rent: Rs.25000");
    }

    #[test]
    fn signature_block_only_for_missing_placeholders() {
        let slots = [slot("[OWNER_SIGNATURE]", None), slot("[TENANT_1_SIGNATURE]", None)];
        let text = "Terms...\n\nOwner: [OWNER_SIGNATURE]";
        let out = ensure_signature_block(text, &slots);
        assert_eq!(out.matches("[OWNER_SIGNATURE]").count(), 1);
        assert!(out.contains("## Signatures"));
        assert!(out.contains("[TENANT_1_SIGNATURE]"));

        let complete = ensure_signature_block(&out, &slots);
        assert_eq!(complete, out);
    }

    #[test]
    fn substitution_embeds_signature_or_blank() {
        let dir = tempfile::tempdir().unwrap();
        let owner = dir.path().join("owner-signature.jpeg");
        std::fs::write(&owner, b"sig-bytes").unwrap();
        let owner = owner.to_string_lossy().into_owned();

        let slots = [
            slot("[OWNER_SIGNATURE]", Some(&owner)),
            slot("[TENANT_1_SIGNATURE]", None),
        ];
        let text = "[OWNER_SIGNATURE]\n[TENANT_1_SIGNATURE]\n[WITNESS_SIGNATURE]";
        let out = substitute_signatures(text, &slots);
        let expected = format!("data:image/jpeg;base64,{}", STANDARD.encode(b"sig-bytes"));
        assert!(out.contains(&format!("![Owner signature]({expected})")));
        assert!(!out.contains(&owner));
        assert!(!out.contains("_SIGNATURE]"));
        assert_eq!(out.matches(SIGNATURE_LINE).count(), 2);
    }

    #[test]
    fn embedded_signature_survives_file_removal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p-signature.png");
        std::fs::write(&path, b"png").unwrap();
        let slots = [slot("[OWNER_SIGNATURE]", Some(path.to_str().unwrap()))];

        let out = substitute_signatures("Signed: [OWNER_SIGNATURE]", &slots);
        std::fs::remove_file(&path).unwrap();
        assert!(out.contains("data:image/png;base64,"));
    }

    #[test]
    fn missing_signature_file_becomes_blank_line() {
        let slots = [slot("[OWNER_SIGNATURE]", Some("/nonexistent/owner-signature.png"))];
        let out = substitute_signatures("[OWNER_SIGNATURE]", &slots);
        assert_eq!(out, SIGNATURE_LINE);
    }

    #[test]
    fn write_document_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("12").join("agreement-1.md");
        write_document(&path, "# Agreement").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "# Agreement");
    }
}
