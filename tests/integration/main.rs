//! Integration tests for protopin

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn protopin(store: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("protopin");
        // keep the global config lookup inside the sandbox
        cmd.env("PROTOPIN_HOME", store.path());
        cmd
    }

    #[test]
    fn help_displays() {
        let store = TempDir::new().unwrap();
        protopin(&store)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("version-pinned protoc builds"));
    }

    #[test]
    fn version_displays() {
        let store = TempDir::new().unwrap();
        protopin(&store)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("protopin"));
    }

    #[test]
    fn build_requires_a_target() {
        let store = TempDir::new().unwrap();
        protopin(&store).arg("build").assert().failure();
    }

    #[test]
    fn build_missing_target_fails() {
        let store = TempDir::new().unwrap();
        protopin(&store)
            .args(["build", "no-such-dir"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("no-such-dir"));
    }

    #[test]
    fn build_without_config_names_the_orphan() {
        let store = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        std::fs::write(project.path().join("x.proto"), "syntax = \"proto3\";\n").unwrap();

        protopin(&store)
            .current_dir(project.path())
            .args(["build", "x.proto"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("no configuration governs"))
            .stderr(predicate::str::contains("protopin.yaml"));
    }

    #[test]
    fn build_empty_directory_succeeds_quietly() {
        let store = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();

        protopin(&store)
            .current_dir(project.path())
            .args(["build", "."])
            .assert()
            .success();
    }

    #[test]
    fn tidy_leaves_pinned_config_untouched() {
        let store = TempDir::new().unwrap();
        let project = TempDir::new().unwrap();
        std::fs::write(
            project.path().join("protopin.yaml"),
            "scopes:\n- ./\nprotoc: v3.17.3\n",
        )
        .unwrap();
        std::fs::write(project.path().join("x.proto"), "syntax = \"proto3\";\n").unwrap();
        let before = std::fs::read_to_string(project.path().join("protopin.yaml")).unwrap();

        protopin(&store)
            .current_dir(project.path())
            .args(["tidy", "."])
            .assert()
            .success();

        let after = std::fs::read_to_string(project.path().join("protopin.yaml")).unwrap();
        assert_eq!(before, after);
    }
}
