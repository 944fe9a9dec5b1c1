use std::process::{Command, Output};

fn runsheet_binary() -> &'static str {
    env!("CARGO_BIN_EXE_runsheet")
}

fn run_runsheet(args: &[&str]) -> Output {
    Command::new(runsheet_binary())
        .args(args)
        .env_remove("RUNSHEET_SERVER_URL")
        .output()
        .expect("Failed to execute runsheet command")
}

fn run_runsheet_with_env(args: &[&str], env_vars: Vec<(&str, &str)>) -> Output {
    let mut cmd = Command::new(runsheet_binary());
    cmd.args(args);
    for (key, value) in env_vars {
        cmd.env(key, value);
    }
    cmd.output().expect("Failed to execute runsheet command")
}

fn output_to_string(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

fn stderr_to_string(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).to_string()
}

mod version_command_tests {
    use super::*;

    #[test]
    fn test_version_command_basic() {
        let output = run_runsheet(&["version"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "version command should succeed");
        assert!(stdout.contains("runsheet"), "output should contain 'runsheet'");
        assert!(
            stdout.contains(env!("CARGO_PKG_VERSION")),
            "output should contain version number"
        );
    }

    #[test]
    fn test_version_command_detailed() {
        let output = run_runsheet(&["version", "--detailed"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success(), "version --detailed should succeed");
        assert!(stdout.contains("Version"));
        assert!(stdout.contains("Apache-2.0"));
        assert!(stdout.contains("PostgreSQL"));
    }

    #[test]
    fn test_version_flag() {
        let output = run_runsheet(&["--version"]);
        assert!(output.status.success());
        assert!(output_to_string(&output).contains("runsheet"));
    }
}

mod help_tests {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        let output = run_runsheet(&["--help"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success());
        for command in ["serve", "init", "health", "runbooks", "exec", "upload"] {
            assert!(stdout.contains(command), "help should mention '{}'", command);
        }
    }

    #[test]
    fn test_exec_help_lists_step_commands() {
        let output = run_runsheet(&["exec", "--help"]);
        let stdout = output_to_string(&output);

        assert!(output.status.success());
        for command in ["start", "check", "uncheck", "remark", "image", "work", "finish"] {
            assert!(stdout.contains(command), "exec help should mention '{}'", command);
        }
    }

    #[test]
    fn test_unknown_command_fails() {
        let output = run_runsheet(&["frobnicate"]);
        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("frobnicate"));
    }

    #[test]
    fn test_invalid_priority_is_rejected() {
        let output = run_runsheet(&["exec", "start", "abc", "--priority", "urgent"]);
        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("urgent"));
    }
}

mod server_error_tests {
    use super::*;

    #[test]
    fn test_health_against_unreachable_server_fails() {
        let output = run_runsheet(&["health", "--server", "http://127.0.0.1:1"]);
        let stderr = stderr_to_string(&output);

        assert!(!output.status.success());
        assert!(stderr.contains("Error"), "stderr was: {}", stderr);
    }

    #[test]
    fn test_invalid_server_url_from_env_fails() {
        let output = run_runsheet_with_env(
            &["runbooks", "list"],
            vec![("RUNSHEET_SERVER_URL", "ftp://example.com")],
        );
        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("Error"));
    }

    #[test]
    fn test_step_zero_is_rejected_before_any_request() {
        let output = run_runsheet(&[
            "exec",
            "check",
            "00000000-0000-4000-8000-000000000000",
            "0",
            "--server",
            "http://127.0.0.1:1",
        ]);
        assert!(!output.status.success());
        assert!(stderr_to_string(&output).contains("Step numbers start at 1"));
    }
}
