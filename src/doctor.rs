use cosign_core::config::{AppConfig, ApprovalSourceKind};

struct CheckResult {
    label: String,
    ok: bool,
    detail: String,
}

pub fn run_doctor(config: &AppConfig) {
    let checks = vec![
        check_workspace(config),
        check_database(config),
        check_model(config),
        check_mail(config),
        check_approval(config),
    ];

    let mut ok_count = 0;
    let mut fail_count = 0;

    for check in &checks {
        let icon = if check.ok { "[OK]" } else { "[!!]" };
        println!("  {} {}: {}", icon, check.label, check.detail);
        if check.ok {
            ok_count += 1;
        } else {
            fail_count += 1;
        }
    }

    println!();
    println!("  {} passed, {} issues found", ok_count, fail_count);
}

fn check_workspace(config: &AppConfig) -> CheckResult {
    let ws = config.workspace_dir();
    if let Err(e) = std::fs::create_dir_all(&ws) {
        return CheckResult {
            label: "Workspace".into(),
            ok: false,
            detail: format!("{} (cannot create: {})", ws.display(), e),
        };
    }

    let test_file = ws.join(".doctor_test");
    match std::fs::write(&test_file, "test") {
        Ok(_) => {
            std::fs::remove_file(&test_file).ok();
            CheckResult {
                label: "Workspace".into(),
                ok: true,
                detail: format!("{}", ws.display()),
            }
        }
        Err(e) => CheckResult {
            label: "Workspace".into(),
            ok: false,
            detail: format!("{} (not writable: {})", ws.display(), e),
        },
    }
}

fn check_database(config: &AppConfig) -> CheckResult {
    let db_path = config.database_path();
    match cosign_store::SqliteStore::open(&db_path) {
        Ok(_) => CheckResult {
            label: "Database".into(),
            ok: true,
            detail: format!("{}", db_path.display()),
        },
        Err(e) => CheckResult {
            label: "Database".into(),
            ok: false,
            detail: format!("{}: {}", db_path.display(), e),
        },
    }
}

fn check_model(config: &AppConfig) -> CheckResult {
    let model = &config.model;
    if model.base_url.trim().is_empty() || model.model_id.trim().is_empty() {
        return CheckResult {
            label: "Model".into(),
            ok: false,
            detail: "base_url and model_id must be set".into(),
        };
    }
    let unresolved = model.api_key.as_ref().is_some_and(|k| k.starts_with("${"));
    if unresolved {
        return CheckResult {
            label: "Model".into(),
            ok: false,
            detail: format!("api_key for {} references an unset env var", model.model_id),
        };
    }
    let key = if model.api_key.is_some() { "with key" } else { "no key" };
    CheckResult {
        label: "Model".into(),
        ok: true,
        detail: format!("{} at {} ({})", model.model_id, model.base_url, key),
    }
}

fn check_mail(config: &AppConfig) -> CheckResult {
    let Some(mail) = &config.mail else {
        return CheckResult {
            label: "Mail".into(),
            ok: true,
            detail: "Not configured (deliveries are logged only)".into(),
        };
    };

    let mut issues = Vec::new();
    if mail.api_key.is_empty() || mail.api_key.starts_with("${") {
        issues.push("api_key missing");
    }
    if !mail.sender.contains('@') {
        issues.push("sender is not an email address");
    }
    if mail.approval_base_url.is_empty() {
        issues.push("approval_base_url missing");
    }

    if issues.is_empty() {
        CheckResult {
            label: "Mail".into(),
            ok: true,
            detail: format!("SMTP2GO as {}", mail.sender),
        }
    } else {
        CheckResult {
            label: "Mail".into(),
            ok: false,
            detail: issues.join(", "),
        }
    }
}

fn check_approval(config: &AppConfig) -> CheckResult {
    let approval = &config.approval;
    match (&approval.source, &approval.websocket_url) {
        (ApprovalSourceKind::Websocket, None) => CheckResult {
            label: "Approval".into(),
            ok: false,
            detail: "websocket source without websocket_url".into(),
        },
        (ApprovalSourceKind::Websocket, Some(url)) => CheckResult {
            label: "Approval".into(),
            ok: true,
            detail: format!("remote feed {} ({}s timeout)", url, approval.timeout_secs),
        },
        (ApprovalSourceKind::Local, _) => CheckResult {
            label: "Approval".into(),
            ok: true,
            detail: format!("local hub ({}s timeout)", approval.timeout_secs),
        },
    }
}
