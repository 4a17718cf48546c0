use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};
use zip::write::FileOptions;
use zip::ZipWriter;

#[allow(deprecated)]
fn cli(store: &Path) -> Command {
    let mut cmd = Command::cargo_bin("context-bundle").expect("binary");
    cmd.arg("--quiet").arg("--store-dir").arg(store);
    cmd
}

fn setup() -> (TempDir, PathBuf, PathBuf) {
    let temp = tempdir().unwrap();
    let store = temp.path().join("store");

    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default();
    for (name, body) in [
        ("app/src/Main.kt", "fun main() {\n    println(\"hi\")\n}\n"),
        ("app/build/out.class", "binary-ish"),
        ("README.md", "# Sample\n"),
    ] {
        zip.start_file(name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    let archive = temp.path().join("sample.zip");
    std::fs::write(&archive, zip.finish().unwrap().into_inner()).unwrap();
    (temp, store, archive)
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid json")
}

#[test]
fn import_tree_bundle_delete_round() {
    let (_temp, store, archive) = setup();

    cli(&store)
        .arg("import")
        .arg(&archive)
        .assert()
        .success()
        .stdout("1\tzip\tsample.zip\n");

    cli(&store)
        .args(["tree", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("│   │   ├─ Main.kt"))
        .stdout(predicate::str::contains("println(\"hi\")"))
        .stdout(predicate::str::contains("out.class").not());

    cli(&store)
        .args(["summary", "1", "Tiny Kotlin app"])
        .assert()
        .success();

    cli(&store)
        .args(["bundle", "1", "--no-instructions"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("# Context bundle: sample.zip\n"))
        .stdout(predicate::str::contains("## Summary\nTiny Kotlin app\n"))
        .stdout(predicate::str::contains("## Project tree"))
        .stdout(predicate::str::contains("## Instructions").not());

    cli(&store).args(["delete", "1"]).assert().success();
    cli(&store).arg("list").assert().success().stdout("");
    cli(&store)
        .args(["bundle", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("File 1 not found"));
}

#[test]
fn tree_json_reports_cache_state() {
    let (_temp, store, archive) = setup();
    cli(&store)
        .args(["import", "--no-index"])
        .arg(&archive)
        .assert()
        .success();

    let first = json_stdout(cli(&store).args(["tree", "1", "--json"]));
    assert_eq!(first["from_cache"], false);
    assert_eq!(first["stats"]["outcome"], "complete");
    assert_eq!(first["stats"]["entries_ignored"], 1);

    let second = json_stdout(cli(&store).args(["tree", "1", "--json"]));
    assert_eq!(second["from_cache"], true);
    assert_eq!(second["tree"], first["tree"]);
}

#[test]
fn config_file_sets_bundle_defaults() {
    let (temp, store, archive) = setup();
    let config = temp.path().join("bundle.toml");
    std::fs::write(
        &config,
        "[bundle]\ninclude_summary = false\ninclude_tree = false\n",
    )
    .unwrap();

    cli(&store).arg("import").arg(&archive).assert().success();
    cli(&store)
        .arg("--config")
        .arg(&config)
        .args(["bundle", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("## Summary").not())
        .stdout(predicate::str::contains("## Project tree").not())
        .stdout(predicate::str::contains("## Instructions"));
}

#[test]
fn preview_search_and_favorites() {
    let (temp, store, archive) = setup();
    let notes = temp.path().join("notes.md");
    std::fs::write(&notes, "first line\nsecond line\n").unwrap();

    cli(&store).arg("import").arg(&archive).assert().success();
    cli(&store)
        .args(["import", "--name", "Design Notes.md"])
        .arg(&notes)
        .assert()
        .success()
        .stdout("2\tmarkdown\tDesign Notes.md\n");

    cli(&store)
        .args(["preview", "2", "--size", "10"])
        .assert()
        .success()
        .stdout("first line");

    cli(&store).args(["favorite", "1"]).assert().success();
    let listed = json_stdout(cli(&store).args(["list", "--json"]));
    assert_eq!(listed[0]["id"], 1);
    assert_eq!(listed[0]["is_favorite"], true);

    let hits = json_stdout(cli(&store).args(["search", "design", "--json"]));
    assert_eq!(hits.as_array().map(Vec::len), Some(1));
    assert_eq!(hits[0]["display_name"], "Design Notes.md");

    cli(&store).args(["archive", "2"]).assert().success();
    let listed = json_stdout(cli(&store).args(["list", "--json"]));
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
}

#[test]
#[allow(deprecated)]
fn relative_store_dir_survives_a_change_of_directory() {
    let (temp, _store, _archive) = setup();
    let workdir = temp.path().join("work");
    std::fs::create_dir_all(&workdir).unwrap();
    let notes = temp.path().join("notes.md");
    std::fs::write(&notes, "kept line\n").unwrap();

    Command::cargo_bin("context-bundle")
        .unwrap()
        .current_dir(&workdir)
        .args(["--quiet", "--store-dir", "rel-store", "import"])
        .arg(&notes)
        .assert()
        .success();

    // Same store, addressed from elsewhere.
    let store = workdir.join("rel-store");
    let listed = json_stdout(cli(&store).current_dir(temp.path()).args(["list", "--json"]));
    let stored_path = listed[0]["file_path"].as_str().expect("path").to_string();
    assert!(Path::new(&stored_path).is_absolute(), "{stored_path}");
    assert!(stored_path.contains("rel-store"));

    cli(&store)
        .current_dir(temp.path())
        .args(["preview", "1"])
        .assert()
        .success()
        .stdout("kept line\n");
    cli(&store)
        .current_dir(temp.path())
        .args(["delete", "1"])
        .assert()
        .success();
    assert!(!Path::new(&stored_path).exists());
}
