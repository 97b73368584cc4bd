use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use cosign_core::types::*;

/// One party to an agreement.
#[derive(Debug, Clone)]
pub struct Party {
    pub id: PartyId,
    pub role: PartyRole,
    /// Placeholder slot, e.g. `OWNER`, `TENANT_2`, `AUTHORITY`.
    pub slot: String,
    /// Human-facing role name used in mail subjects ("Owner", "Tenant", ...).
    pub role_label: String,
    pub email: String,
    pub display_name: String,
    pub vote: Vote,
    pub signature_ref: Option<PathBuf>,
    pub photo_ref: Option<PathBuf>,
    /// Signature reference that was attached when this party approved.
    pub signature_at_vote: Option<PathBuf>,
}

impl Party {
    pub fn new(role: PartyRole, slot: &str, role_label: &str, contact: &ContactDetails) -> Self {
        Self {
            id: PartyId::new(),
            role,
            slot: slot.to_string(),
            role_label: role_label.to_string(),
            email: contact.email.clone(),
            display_name: contact.name.clone(),
            vote: Vote::Unset,
            signature_ref: None,
            photo_ref: None,
            signature_at_vote: None,
        }
    }

    /// `[<SLOT>_SIGNATURE]`
    pub fn signature_placeholder(&self) -> String {
        format!("[{}_SIGNATURE]", self.slot)
    }
}

/// Variant data of an agreement; the discriminant is [`AgreementKind`].
#[derive(Debug, Clone)]
pub enum AgreementForm {
    Direct(RentalTerms),
    Template {
        terms: TemplateTerms,
        template_path: PathBuf,
    },
}

impl AgreementForm {
    pub fn kind(&self) -> AgreementKind {
        match self {
            Self::Direct(_) => AgreementKind::Direct,
            Self::Template { .. } => AgreementKind::Template,
        }
    }
}

/// Result of applying one inbound vote to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteEffect {
    /// The voter is not a party to this agreement.
    UnknownParty,
    /// The record is already settled by a rejection; the vote was dropped.
    Ignored,
    Approved { fully_approved: bool },
    Rejected,
}

/// Identity plus mutable approval state of one agreement instance.
#[derive(Debug)]
pub struct AgreementRecord {
    pub agreement_id: AgreementId,
    pub form: Option<AgreementForm>,
    pub parties: Vec<Party>,
    pub document_text: String,
    pub document_path: Option<PathBuf>,
    pub is_final_rendered: bool,
    /// Directory holding every temp file this record owns.
    pub temp_dir: Option<PathBuf>,
    temp_files: Vec<PathBuf>,
    render_seq: u32,
}

impl AgreementRecord {
    pub fn new(agreement_id: AgreementId) -> Self {
        Self {
            agreement_id,
            form: None,
            parties: Vec::new(),
            document_text: String::new(),
            document_path: None,
            is_final_rendered: false,
            temp_dir: None,
            temp_files: Vec::new(),
            render_seq: 0,
        }
    }

    pub fn kind(&self) -> AgreementKind {
        self.form
            .as_ref()
            .map(AgreementForm::kind)
            .unwrap_or(AgreementKind::Direct)
    }

    pub fn party(&self, party_id: &str) -> Option<&Party> {
        self.parties.iter().find(|p| p.id.as_str() == party_id)
    }

    pub fn party_mut(&mut self, party_id: &str) -> Option<&mut Party> {
        self.parties.iter_mut().find(|p| p.id.as_str() == party_id)
    }

    pub fn has_party(&self, party_id: &str) -> bool {
        self.party(party_id).is_some()
    }

    /// True iff there is at least one party and every party approved.
    pub fn fully_approved(&self) -> bool {
        !self.parties.is_empty() && self.parties.iter().all(|p| p.vote == Vote::Approved)
    }

    /// True once any party rejected.
    pub fn is_rejected(&self) -> bool {
        self.parties.iter().any(|p| p.vote == Vote::Rejected)
    }

    /// Apply one vote. Unanimous approve, any reject; a rejection freezes the record.
    pub fn cast_vote(&mut self, party_id: &str, approved: bool) -> VoteEffect {
        if !self.has_party(party_id) {
            return VoteEffect::UnknownParty;
        }
        if self.is_rejected() {
            return VoteEffect::Ignored;
        }

        let Some(party) = self.party_mut(party_id) else {
            return VoteEffect::UnknownParty;
        };
        if approved {
            party.vote = Vote::Approved;
            // Read the signature as it is right now; later uploads win at render time.
            party.signature_at_vote = party.signature_ref.clone();
            VoteEffect::Approved {
                fully_approved: self.fully_approved(),
            }
        } else {
            party.vote = Vote::Rejected;
            VoteEffect::Rejected
        }
    }

    /// Mark every party approved. Used once the listener reported full approval.
    pub fn approve_all(&mut self) {
        for party in &mut self.parties {
            if party.vote != Vote::Approved {
                warn!(
                    agreement_id = %self.agreement_id,
                    party_id = %party.id,
                    "Re-asserting approval for party without a recorded vote"
                );
                party.vote = Vote::Approved;
            }
        }
    }

    pub fn signature_placeholders(&self) -> Vec<String> {
        self.parties.iter().map(Party::signature_placeholder).collect()
    }

    /// Next unique document file name inside the temp dir.
    pub fn next_document_path(&mut self) -> Option<PathBuf> {
        let dir = self.temp_dir.clone()?;
        self.render_seq += 1;
        Some(dir.join(format!("agreement-{}.md", self.render_seq)))
    }

    /// Register a file this record owns and must delete on cleanup.
    pub fn track_temp_file(&mut self, path: PathBuf) {
        if !self.temp_files.contains(&path) {
            self.temp_files.push(path);
        }
    }

    pub fn temp_files(&self) -> &[PathBuf] {
        &self.temp_files
    }

    /// Swap in a freshly rendered document, deleting the one it replaces.
    pub fn replace_document(&mut self, path: PathBuf) {
        if let Some(old) = self.document_path.take() {
            if old != path {
                remove_file_quietly(&old);
                self.temp_files.retain(|p| p != &old);
            }
        }
        self.track_temp_file(path.clone());
        self.document_path = Some(path);
    }

    /// Delete every temp file and the temp dir. Safe to call repeatedly.
    pub fn remove_temp_files(&mut self) {
        for path in self.temp_files.drain(..) {
            remove_file_quietly(&path);
        }
        if let Some(dir) = &self.temp_dir {
            match std::fs::remove_dir_all(dir) {
                Ok(()) => debug!(dir = %dir.display(), "Removed agreement temp dir"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(dir = %dir.display(), error = %e, "Failed to remove temp dir"),
            }
        }
        self.document_path = None;
        self.is_final_rendered = false;
    }
}

/// Remove a file; a missing file is not an error.
pub(crate) fn remove_file_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Temp file deleted"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete temp file"),
    }
}
