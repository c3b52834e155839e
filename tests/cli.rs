use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use tempfile::{tempdir, TempDir};

fn bin() -> Command {
    let path = assert_cmd::cargo::cargo_bin!("rctf");
    Command::new(path)
}

/// Install fake `docker-compose` and `git` that record their arguments and exit with `code`.
#[cfg(unix)]
fn fake_tools(code: i32) -> TempDir {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    for tool in ["docker-compose", "git"] {
        let path = dir.path().join(tool);
        fs::write(
            &path,
            format!(
                "#!/bin/sh\necho \"{tool} $* name=$RCTF_NAME\" >> calls.log\n\
                 echo {tool} ran\nexit {code}\n"
            ),
        )
        .unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }
    dir
}

#[cfg(unix)]
fn path_with(dir: &Path) -> String {
    format!("{}:{}", dir.display(), std::env::var("PATH").unwrap_or_default())
}

fn calls(install: &Path) -> Vec<String> {
    fs::read_to_string(install.join("calls.log"))
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
fn config_path_prints_location_without_creating_it() {
    let install = tempdir().unwrap();
    bin()
        .args(["config", "path", "--install-path"])
        .arg(install.path())
        .assert()
        .success()
        .stdout(contains(".config.json"));
    assert!(!install.path().join(".config.json").exists());
}

#[test]
fn config_set_get_list_roundtrip() {
    let install = tempdir().unwrap();

    bin()
        .env("RCTF_INSTALL_PATH", install.path())
        .args(["config", "set", "ctf.name", "myctf"])
        .assert()
        .success();

    bin()
        .env("RCTF_INSTALL_PATH", install.path())
        .args(["config", "get", "ctf.name"])
        .assert()
        .success()
        .stdout("myctf\n");

    bin()
        .env("RCTF_INSTALL_PATH", install.path())
        .args(["config", "list"])
        .assert()
        .success()
        .stdout("cli.ansi=true\nctf.name=myctf\n");
}

#[test]
fn config_get_missing_key_fails() {
    let install = tempdir().unwrap();
    bin()
        .env("RCTF_INSTALL_PATH", install.path())
        .args(["--no-ansi", "config", "get", "nope"])
        .assert()
        .failure()
        .stderr(contains("nope"));
}

#[test]
fn config_unset_removes_key() {
    let install = tempdir().unwrap();
    fs::write(install.path().join(".config.json"), r#"{"ctf.name": "x", "db.url": "y"}"#).unwrap();

    bin()
        .env("RCTF_INSTALL_PATH", install.path())
        .args(["config", "unset", "ctf.name"])
        .assert()
        .success();

    let raw = fs::read_to_string(install.path().join(".config.json")).unwrap();
    let on_disk: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(on_disk, serde_json::json!({ "db.url": "y" }));

    bin()
        .env("RCTF_INSTALL_PATH", install.path())
        .args(["config", "unset", "ctf.name"])
        .assert()
        .failure();
}

#[test]
fn config_regenerate_imports_dotenv() {
    let install = tempdir().unwrap();
    fs::write(install.path().join(".env"), "RCTF_NAME=myctf\nUNRELATED=x\n").unwrap();
    fs::write(install.path().join(".config.json"), r#"{"old": "1"}"#).unwrap();

    bin()
        .env("RCTF_INSTALL_PATH", install.path())
        .args(["config", "regenerate"])
        .assert()
        .success();

    bin()
        .env("RCTF_INSTALL_PATH", install.path())
        .args(["config", "list"])
        .assert()
        .success()
        .stdout("cli.ansi=true\nctf.name=myctf\n");
}

#[test]
fn malformed_config_is_reported() {
    let install = tempdir().unwrap();
    fs::write(install.path().join(".config.json"), "{ broken").unwrap();

    bin()
        .env("RCTF_INSTALL_PATH", install.path())
        .args(["--no-ansi", "config", "list"])
        .assert()
        .failure()
        .stderr(contains("config error"));
}

#[test]
fn explicit_config_flag_overrides_location() {
    let install = tempdir().unwrap();
    let other = tempdir().unwrap();
    let config = other.path().join("custom.json");

    bin()
        .env("RCTF_INSTALL_PATH", install.path())
        .arg("--config")
        .arg(&config)
        .args(["config", "set", "smtp.from", "ctf@example.com"])
        .assert()
        .success();

    assert!(config.is_file());
    assert!(!install.path().join(".config.json").exists());
}

#[cfg(unix)]
#[test]
fn start_runs_compose_up_in_install_dir_with_config_env() {
    let install = tempdir().unwrap();
    let tools = fake_tools(0);
    fs::write(install.path().join(".env"), "RCTF_NAME=myctf\n").unwrap();

    bin()
        .env("RCTF_INSTALL_PATH", install.path())
        .env("PATH", path_with(tools.path()))
        .env_remove("RCTF_NAME")
        .args(["--no-ansi", "start"])
        .assert()
        .success()
        .stderr(contains("docker-compose ran"));

    assert_eq!(calls(install.path()), ["docker-compose --no-ansi up -d --build name=myctf"]);
}

#[cfg(unix)]
#[test]
fn stop_failure_exits_nonzero() {
    let install = tempdir().unwrap();
    let tools = fake_tools(2);

    bin()
        .env("RCTF_INSTALL_PATH", install.path())
        .env("PATH", path_with(tools.path()))
        .env_remove("RCTF_NAME")
        .args(["--no-ansi", "stop"])
        .assert()
        .failure()
        .stderr(contains("Failed to stop rCTF instance."));

    assert_eq!(calls(install.path()), ["docker-compose --no-ansi down name="]);
}

#[cfg(unix)]
#[test]
fn upgrade_runs_down_pull_build() {
    let install = tempdir().unwrap();
    let tools = fake_tools(0);

    bin()
        .env("RCTF_INSTALL_PATH", install.path())
        .env("PATH", path_with(tools.path()))
        .env_remove("RCTF_NAME")
        .args(["--no-ansi", "upgrade"])
        .assert()
        .success();

    assert_eq!(
        calls(install.path()),
        [
            "docker-compose --no-ansi down name=",
            "git pull name=",
            "docker-compose --no-ansi build --no-cache name=",
        ]
    );
}
