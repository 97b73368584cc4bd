//! HTML bodies for agreement emails.

use cosign_core::types::{AgreementKind, Delivery};

const STYLE: &str = "body { font-family: Arial, sans-serif; line-height: 1.6; color: #333; \
padding: 20px; background-color: #f4f4f4; }
.container { max-width: 600px; margin: 0 auto; background: #fff; padding: 20px; \
border-radius: 8px; box-shadow: 0 0 10px rgba(0, 0, 0, 0.1); }
.button { display: inline-block; padding: 10px 20px; margin: 10px 5px; border-radius: 5px; \
text-decoration: none; color: white; }
.approve { background-color: #28a745; }
.reject { background-color: #dc3545; }";

fn document_noun(kind: AgreementKind) -> &'static str {
    match kind {
        AgreementKind::Direct => "Rental Agreement",
        AgreementKind::Template => "Agreement",
    }
}

pub fn subject(delivery: &Delivery) -> String {
    let noun = document_noun(delivery.kind);
    if delivery.is_final {
        format!("Signed {} for {}", noun, delivery.role_label)
    } else {
        format!("{} for {}", noun, delivery.role_label)
    }
}

pub fn approve_url(base: &str, delivery: &Delivery) -> String {
    format!("{}/{}/approve", base.trim_end_matches('/'), delivery.party_id)
}

pub fn reject_url(base: &str, delivery: &Delivery) -> String {
    format!("{}/{}/reject", base.trim_end_matches('/'), delivery.party_id)
}

/// Email body. Drafts carry approve/reject links; final copies do not.
pub fn html_body(delivery: &Delivery, approval_base_url: &str) -> String {
    let noun = document_noun(delivery.kind).to_lowercase();
    let content = if delivery.is_final {
        format!(
            "<p>All parties have approved. The final signed {} is attached for your records.</p>",
            noun
        )
    } else {
        format!(
            "<p>Please review and sign the attached {noun}.</p>
            <p>Click on one of the following links to approve or reject the agreement:</p>
            <p>
                <a href=\"{approve}\" class=\"button approve\">Approve Agreement</a>
                <a href=\"{reject}\" class=\"button reject\">Reject Agreement</a>
            </p>",
            noun = noun,
            approve = approve_url(approval_base_url, delivery),
            reject = reject_url(approval_base_url, delivery),
        )
    };

    format!(
        "<!DOCTYPE html>
<html>
<head>
    <meta charset=\"UTF-8\">
    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">
    <title>{title}</title>
    <style>{style}</style>
</head>
<body>
    <div class=\"container\">
        <p>Hello {name},</p>
        {content}
        <p>Best regards,<br>Cosign Team</p>
    </div>
</body>
</html>",
        title = subject(delivery),
        style = STYLE,
        name = delivery.display_name,
        content = content,
    )
}
