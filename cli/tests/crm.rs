use assert_cmd::Command;
use predicates::str::contains;
use std::path::Path;
use tempfile::tempdir;

fn crm(db: &Path) -> Result<Command, Box<dyn std::error::Error>> {
    let mut cmd = Command::cargo_bin("crm")?;
    cmd.env("CRM_GATEWAY_BACKEND", "sqlite")
        .env("CRM_SQLITE_PATH", db)
        .env_remove("RUST_LOG");
    Ok(cmd)
}

#[test]
fn task_create_get_delete_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let db = dir.path().join("crm.db");

    crm(&db)?
        .args(["tasks", "create", r#"{"title":"Ship release","priority":"High"}"#])
        .assert()
        .success()
        .stdout(contains(r#""title": "Ship release""#))
        .stdout(contains(r#""Id": 1"#));

    crm(&db)?
        .args(["tasks", "get", "1"])
        .assert()
        .success()
        .stdout(contains(r#""priority": "High""#))
        .stdout(contains(r#""categoryId": 1"#));

    crm(&db)?
        .args(["tasks", "search", "SHIP"])
        .assert()
        .success()
        .stdout(contains("Ship release"));

    crm(&db)?
        .args(["tasks", "delete", "1"])
        .assert()
        .success()
        .stdout(contains(r#""success": true"#));

    crm(&db)?
        .args(["tasks", "get", "1"])
        .assert()
        .failure()
        .stderr(contains("not found"));
    Ok(())
}

#[test]
fn records_persist_between_runs_without_configuration() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let bare = || -> Result<Command, Box<dyn std::error::Error>> {
        let mut cmd = Command::cargo_bin("crm")?;
        cmd.current_dir(dir.path())
            .env_remove("CRM_GATEWAY_BACKEND")
            .env_remove("CRM_SQLITE_PATH")
            .env_remove("RUST_LOG");
        Ok(cmd)
    };

    bare()?
        .args(["contacts", "create", r#"{"name":"Ana"}"#])
        .assert()
        .success();
    bare()?
        .args(["contacts", "get", "1"])
        .assert()
        .success()
        .stdout(contains(r#""name": "Ana""#));
    assert!(dir.path().join(".crm").join("crm.db").exists());
    Ok(())
}

#[test]
fn duplicate_lead_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let db = dir.path().join("crm.db");

    crm(&db)?
        .args(["leads", "create", r#"{"websiteUrl":"acme.io"}"#])
        .assert()
        .success()
        .stdout(contains(r#""status": "Keep an Eye""#));

    crm(&db)?
        .args(["leads", "create", r#"{"websiteUrl":" acme.io "}"#])
        .assert()
        .failure()
        .stderr(contains("already exists"));
    Ok(())
}

#[test]
fn export_then_import_into_fresh_store() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let db = dir.path().join("crm.db");
    let copy = dir.path().join("copy.db");

    for name in ["Work", "Home"] {
        crm(&db)?
            .args(["categories", "create", &format!(r#"{{"name":"{name}"}}"#)])
            .assert()
            .success();
    }

    let out = crm(&db)?.args(["export", "categories"]).output()?;
    assert!(out.status.success());
    let lines = String::from_utf8(out.stdout)?;
    assert_eq!(lines.lines().count(), 2);

    crm(&copy)?
        .args(["import", "categories"])
        .write_stdin(lines)
        .assert()
        .success()
        .stdout(contains(r#""imported": 2"#));

    crm(&copy)?
        .args(["categories", "list"])
        .assert()
        .success()
        .stdout(contains("Work"))
        .stdout(contains("Home"));
    Ok(())
}

#[test]
fn bulk_delete_reports_each_id() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let db = dir.path().join("crm.db");

    crm(&db)?
        .args(["contacts", "create", r#"{"name":"Ana"}"#])
        .assert()
        .success();

    crm(&db)?
        .args(["contacts", "bulk-delete", "1", "99"])
        .assert()
        .success()
        .stdout(contains(r#""success": true"#))
        .stdout(contains(r#""success": false"#));
    Ok(())
}

#[test]
fn lead_activity_report_searches_sites() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let db = dir.path().join("crm.db");
    for site in ["https://acme.io/", "globex.com"] {
        crm(&db)?
            .args(["leads", "create", &format!(r#"{{"websiteUrl":"{site}"}}"#)])
            .assert()
            .success();
    }

    crm(&db)?
        .args(["leads", "activity", "--search", "ACME"])
        .assert()
        .success()
        .stdout(contains(r#""websiteUrl": "acme.io""#))
        .stdout(contains(r#""totalUrls": 1"#));

    crm(&db)?
        .args(["leads", "activity", "--export"])
        .assert()
        .success()
        .stdout(contains(r#""Website URL": "globex.com""#))
        .stdout(contains(r#""Added By": "Current User""#));
    Ok(())
}

#[test]
fn unknown_backend_fails_cleanly() -> Result<(), Box<dyn std::error::Error>> {
    Command::cargo_bin("crm")?
        .env("CRM_GATEWAY_BACKEND", "postgres")
        .args(["tasks", "list"])
        .assert()
        .failure()
        .stderr(contains("unknown backend"));
    Ok(())
}
