//! Command line interface tests

#[cfg(test)]
mod tests {
    use assert_cmd::Command;
    use predicates::prelude::*;

    #[test]
    fn test_help_lists_options() {
        Command::cargo_bin("s3file")
            .unwrap()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("--config"))
            .stdout(predicate::str::contains("--log-level"));
    }

    #[test]
    fn test_missing_config_file_fails() {
        Command::cargo_bin("s3file")
            .unwrap()
            .args(["--config", "/nonexistent/s3file.yaml"])
            .assert()
            .failure();
    }
}
