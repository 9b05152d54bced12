//! Integration tests for the lootdb CLI
//!
//! These tests exercise the CLI commands end-to-end using assert_cmd.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Helper to get a lootdb command isolated from the user's environment
fn lootdb(tmp: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("lootdb").unwrap();
    cmd.current_dir(tmp.path())
        .env("XDG_CONFIG_HOME", tmp.path().join(".xdg"))
        .env("HOME", tmp.path())
        .env_remove("LOOTDB_CONTENT_VERSION")
        .env_remove("LOOTDB_OUTPUT_DIR")
        .env_remove("LOOTDB_THREADS")
        .env_remove("RUST_LOG");
    cmd
}

/// Helper to create an empty project in a temp directory
fn setup_test_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    lootdb(&tmp).arg("init").assert().success();
    tmp
}

fn filter(rules: &[String]) -> String {
    format!(
        "<?xml version=\"1.0\"?>\n<ItemFilter xmlns:i=\"http://www.w3.org/2001/XMLSchema-instance\">\n  <rules>\n{}\n  </rules>\n</ItemFilter>\n",
        rules.join("\n")
    )
}

fn affix_rule(label: &str, id: u32) -> String {
    format!(
        r#"    <Rule><type>SHOW</type><conditions><Condition i:type="AffixCondition"><affixes><int>{}</int></affixes></Condition></conditions><nameOverride>{}</nameOverride></Rule>"#,
        id, label
    )
}

/// Project with affix templates, one override and a duplicate name
fn setup_populated_project() -> TempDir {
    let tmp = setup_test_project();
    let root = tmp.path();
    write_affixes(
        root,
        &[
            affix_rule("Affix ID: 140", 140),
            affix_rule("Health", 100),
            affix_rule("Health", 200),
            affix_rule("Affix ID: 7", 7),
        ],
    );
    fs::write(
        root.join("overrides/affix_overrides.yaml"),
        "version: \"1.0\"\nlast_modified: \"2026-01-01\"\noverrides:\n  140:\n    name: \"+# to Minion Damage\"\n    properties:\n      tags: [summoner]\n",
    )
    .unwrap();
    tmp
}

fn write_affixes(root: &Path, rules: &[String]) {
    fs::write(root.join("templates/affixes/affixes.xml"), filter(rules)).unwrap();
}

// ============================================================================
// CLI Basic Tests
// ============================================================================

#[test]
fn test_help_displays() {
    let tmp = TempDir::new().unwrap();
    lootdb(&tmp)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("build"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("lookup"));
}

#[test]
fn test_version_displays() {
    let tmp = TempDir::new().unwrap();
    lootdb(&tmp)
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("lootdb"));
}

#[test]
fn test_completions_bash() {
    let tmp = TempDir::new().unwrap();
    lootdb(&tmp)
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lootdb"));
}

#[test]
fn test_command_outside_project_fails() {
    let tmp = TempDir::new().unwrap();
    lootdb(&tmp)
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a lootdb project"));
}

// ============================================================================
// Init Tests
// ============================================================================

#[test]
fn test_init_creates_structure() {
    let tmp = TempDir::new().unwrap();
    lootdb(&tmp)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized lootdb project"));

    assert!(tmp.path().join(".lootdb/config.yaml").is_file());
    for table in ["colors.xml", "sounds.xml", "beams.xml"] {
        assert!(tmp.path().join("templates").join(table).is_file());
    }
    for dir in ["affixes", "uniques", "sets"] {
        assert!(tmp.path().join("templates").join(dir).is_dir());
    }
    assert!(tmp.path().join("overrides").is_dir());
}

#[test]
fn test_init_twice_reports_existing() {
    let tmp = setup_test_project();
    lootdb(&tmp)
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

// ============================================================================
// Build Tests
// ============================================================================

#[test]
fn test_build_empty_project() {
    let tmp = setup_test_project();
    lootdb(&tmp)
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("Built database"));

    let out = tmp.path().join("database");
    assert!(out.join("database.yaml").is_file());
    assert!(out.join("BUILD_SUMMARY.md").is_file());
    assert!(out.join("build.log").is_file());
    assert!(out.join("index/ids.json").is_file());
}

#[test]
fn test_second_build_is_skipped() {
    let tmp = setup_populated_project();
    lootdb(&tmp).arg("build").assert().success();
    let snapshot = fs::read_to_string(tmp.path().join("database/database.yaml")).unwrap();

    lootdb(&tmp)
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));
    assert_eq!(
        fs::read_to_string(tmp.path().join("database/database.yaml")).unwrap(),
        snapshot
    );
}

#[test]
fn test_forced_build_is_byte_identical() {
    let tmp = setup_populated_project();
    lootdb(&tmp).arg("build").assert().success();
    let snapshot = fs::read(tmp.path().join("database/database.yaml")).unwrap();
    let ids = fs::read(tmp.path().join("database/index/ids.json")).unwrap();

    lootdb(&tmp)
        .args(["build", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Built database"));
    assert_eq!(fs::read(tmp.path().join("database/database.yaml")).unwrap(), snapshot);
    assert_eq!(fs::read(tmp.path().join("database/index/ids.json")).unwrap(), ids);
}

#[test]
fn test_build_reports_duplicate_names() {
    let tmp = setup_populated_project();
    lootdb(&tmp)
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("duplicate-name affix [100,200]"));

    let summary = fs::read_to_string(tmp.path().join("database/BUILD_SUMMARY.md")).unwrap();
    assert!(summary.contains("- **Duplicate names:** 1"));
    assert!(summary.contains("- **Overrides applied:** 1"));
}

#[test]
fn test_snapshot_marks_missing_entries() {
    let tmp = setup_populated_project();
    lootdb(&tmp).arg("build").assert().success();

    let snapshot = fs::read_to_string(tmp.path().join("database/database.yaml")).unwrap();
    assert!(snapshot.contains("status: missing"));
    assert!(snapshot.contains("+# to Minion Damage"));
}

#[test]
fn test_missing_reference_table_fails() {
    let tmp = setup_test_project();
    fs::remove_file(tmp.path().join("templates/sounds.xml")).unwrap();

    lootdb(&tmp)
        .arg("build")
        .assert()
        .failure()
        .stderr(predicate::str::contains("reference table missing"));
    assert!(!tmp.path().join("database/database.yaml").exists());
}

#[test]
fn test_broken_template_does_not_fail_build() {
    let tmp = setup_populated_project();
    fs::write(tmp.path().join("templates/affixes/broken.xml"), "<ItemFilter><rules>").unwrap();

    lootdb(&tmp)
        .arg("build")
        .assert()
        .success()
        .stdout(predicate::str::contains("(1 failed)"));
}

#[test]
fn test_content_version_from_env() {
    let tmp = setup_test_project();
    lootdb(&tmp)
        .arg("build")
        .env("LOOTDB_CONTENT_VERSION", "1.3.2")
        .assert()
        .success()
        .stdout(predicate::str::contains("1.3.2"));

    // Same files, new version: not up to date
    lootdb(&tmp)
        .arg("build")
        .env("LOOTDB_CONTENT_VERSION", "1.4.0")
        .assert()
        .success()
        .stdout(predicate::str::contains("Built database"))
        .stdout(predicate::str::contains("1.4.0"));
    let snapshot = fs::read_to_string(tmp.path().join("database/database.yaml")).unwrap();
    assert!(snapshot.contains("1.4.0"));
}

#[test]
fn test_broken_tag_rule_removes_tag_index() {
    let tmp = setup_populated_project();
    lootdb(&tmp).arg("build").assert().success();
    assert!(tmp.path().join("database/index/tags.json").is_file());

    let config = tmp.path().join(".lootdb/config.yaml");
    let mut contents = fs::read_to_string(&config).unwrap();
    contents.push_str("\ntag_rules:\n  - label: broken\n    pattern: \"(\"\n");
    fs::write(&config, contents).unwrap();

    lootdb(&tmp).arg("build").assert().success();
    assert!(!tmp.path().join("database/index/tags.json").exists());

    lootdb(&tmp)
        .args(["tags", "summoner"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("tag index unavailable"));
}

// ============================================================================
// Query Tests
// ============================================================================

#[test]
fn test_lookup_override_entry() {
    let tmp = setup_populated_project();
    lootdb(&tmp).arg("build").assert().success();

    lootdb(&tmp)
        .args(["lookup", "affix", "140"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Affix 140: +# to Minion Damage"))
        .stdout(predicate::str::contains("override-applied"));
}

#[test]
fn test_lookup_json_output() {
    let tmp = setup_populated_project();
    lootdb(&tmp).arg("build").assert().success();

    lootdb(&tmp)
        .args(["lookup", "affixes", "7", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"status\": \"missing\""));
}

#[test]
fn test_lookup_unknown_id_fails() {
    let tmp = setup_populated_project();
    lootdb(&tmp).arg("build").assert().success();

    lootdb(&tmp)
        .args(["lookup", "affix", "9999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no affix with id 9999"));
}

#[test]
fn test_lookup_before_build_fails() {
    let tmp = setup_test_project();
    lootdb(&tmp)
        .args(["lookup", "affix", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("lootdb build"));
}

#[test]
fn test_tags_lists_tagged_entries() {
    let tmp = setup_populated_project();
    lootdb(&tmp).arg("build").assert().success();

    lootdb(&tmp)
        .args(["tags", "summoner"])
        .assert()
        .success()
        .stdout(predicate::str::contains("140"));

    lootdb(&tmp)
        .args(["tags", "minion+damage"])
        .assert()
        .success()
        .stdout(predicate::str::contains("+# to Minion Damage"));
}

#[test]
fn test_status_shows_counts() {
    let tmp = setup_populated_project();
    lootdb(&tmp).arg("build").assert().success();

    lootdb(&tmp)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Database Status"))
        .stdout(predicate::str::contains("affixes"));
}

// ============================================================================
// Validate Tests
// ============================================================================

#[test]
fn test_validate_does_not_write() {
    let tmp = setup_populated_project();
    lootdb(&tmp)
        .arg("validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Duplicate names: 1"));
    assert!(!tmp.path().join("database/database.yaml").exists());
}

#[test]
fn test_validate_strict_fails_on_issues() {
    let tmp = setup_populated_project();
    lootdb(&tmp)
        .args(["validate", "--strict"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("strict mode"));
}

#[test]
fn test_validate_clean_project() {
    let tmp = setup_test_project();
    lootdb(&tmp)
        .args(["validate", "--strict"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No issues found"));
}
