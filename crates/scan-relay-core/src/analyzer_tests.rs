//! Tests for analyzer argument construction and invocation.

use super::*;
use std::path::PathBuf;

fn config() -> AnalyzerConfig {
    AnalyzerConfig {
        java_program: "java".to_string(),
        jar_path: PathBuf::from("/opt/analyzer/analyzer.jar"),
        working_dir: PathBuf::from("/var/lib/analyzer/work"),
        home_dir: PathBuf::from("/opt/analyzer"),
        secondary_runtime_dir: None,
        timeout_seconds: 60,
    }
}

#[test]
fn test_arguments_follow_cli_contract() {
    let analyzer = JavaAnalyzer::new(config(), "1234", "tok");
    let args = analyzer.build_arguments(Path::new("/srv/scan/G1"), 42);

    assert_eq!(
        args,
        vec![
            "-jar",
            "/opt/analyzer/analyzer.jar",
            "--workingDir",
            "/var/lib/analyzer/work",
            "--sourceDir",
            "/srv/scan/G1",
            "--companyId",
            "1234",
            "--applicationId",
            "42",
            "--tokenAuth",
            "tok",
        ]
    );
}

#[test]
fn test_secondary_runtime_flag_is_appended_when_configured() {
    let analyzer = JavaAnalyzer::new(
        AnalyzerConfig {
            secondary_runtime_dir: Some(PathBuf::from("/opt/perl")),
            ..config()
        },
        "1234",
        "tok",
    );
    let args = analyzer.build_arguments(Path::new("/srv/scan/G1"), 42);

    assert_eq!(&args[args.len() - 2..], ["--perlInstallDir", "/opt/perl"]);
}

#[test]
fn test_source_dir_uses_forward_slashes() {
    assert_eq!(
        to_forward_slashes(Path::new(r"C:\scan\G1")),
        "C:/scan/G1"
    );

    let analyzer = JavaAnalyzer::new(config(), "1234", "tok");
    let args = analyzer.build_arguments(Path::new(r"D:\targets\G7"), 7);
    assert!(args.contains(&"D:/targets/G7".to_string()));
}

#[test]
fn test_redacted_arguments_hide_token() {
    let analyzer = JavaAnalyzer::new(config(), "1234", "super-secret");
    let args = analyzer.redacted_arguments(Path::new("/srv/scan/G1"), 42);

    assert!(!args.iter().any(|a| a.contains("super-secret")));
    assert!(args.contains(&"<REDACTED>".to_string()));
    assert!(args.contains(&"42".to_string()));
}

#[test]
fn test_debug_hides_token() {
    let analyzer = JavaAnalyzer::new(config(), "1234", "super-secret");
    let debug_str = format!("{:?}", analyzer);

    assert!(!debug_str.contains("super-secret"));
    assert!(debug_str.contains("1234"));
}

#[test]
fn test_non_zero_exit_display() {
    let error = InvocationError::NonZeroExit {
        code: Some(3),
        stdout: String::new(),
        stderr: String::new(),
    };
    assert_eq!(error.to_string(), "analyzer exited with status 3");

    let killed = InvocationError::NonZeroExit {
        code: None,
        stdout: String::new(),
        stderr: String::new(),
    };
    assert!(killed.to_string().contains("signal"));
}

// ============================================================================
// JavaAnalyzer against a shell stand-in
// ============================================================================

#[cfg(unix)]
mod process_tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    struct Fixture {
        _dir: tempfile::TempDir,
        home: PathBuf,
        program: String,
    }

    /// Fake launcher that records its arguments and cwd into the home dir.
    fn fixture(tail: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        std::fs::create_dir_all(&home).unwrap();

        let program = dir.path().join("fake-java");
        std::fs::write(
            &program,
            format!("#!/bin/sh\nprintf '%s\\n' \"$@\" > args.txt\npwd > cwd.txt\n{tail}\n"),
        )
        .unwrap();
        std::fs::set_permissions(&program, std::fs::Permissions::from_mode(0o755)).unwrap();

        Fixture {
            home,
            program: program.to_string_lossy().into_owned(),
            _dir: dir,
        }
    }

    fn analyzer_for(fixture: &Fixture, timeout_seconds: u64, token: &str) -> JavaAnalyzer {
        JavaAnalyzer::new(
            AnalyzerConfig {
                java_program: fixture.program.clone(),
                home_dir: fixture.home.clone(),
                timeout_seconds,
                ..config()
            },
            "1234",
            token,
        )
    }

    #[tokio::test]
    async fn test_runs_in_analyzer_home_without_moving_service_cwd() {
        let fixture = fixture("echo scanned; exit 0");
        let analyzer = analyzer_for(&fixture, 10, "tok");
        let cwd_before = std::env::current_dir().unwrap();

        let report = analyzer
            .invoke(Path::new("/srv/scan/G1"), 42)
            .await
            .unwrap();

        assert_eq!(report.exit_code, 0);
        assert_eq!(report.stdout.trim(), "scanned");
        assert_eq!(std::env::current_dir().unwrap(), cwd_before);

        let recorded_cwd = std::fs::read_to_string(fixture.home.join("cwd.txt")).unwrap();
        assert_eq!(
            PathBuf::from(recorded_cwd.trim()).canonicalize().unwrap(),
            fixture.home.canonicalize().unwrap()
        );

        let recorded_args = std::fs::read_to_string(fixture.home.join("args.txt")).unwrap();
        let lines: Vec<&str> = recorded_args.lines().collect();
        assert_eq!(lines, analyzer.build_arguments(Path::new("/srv/scan/G1"), 42));
    }

    #[tokio::test]
    async fn test_failure_captures_output_and_code() {
        let fixture = fixture("echo partial; echo 'license expired' >&2; exit 4");
        let analyzer = analyzer_for(&fixture, 10, "tok");

        let result = analyzer.invoke(Path::new("/srv/scan/G1"), 42).await;

        match result {
            Err(InvocationError::NonZeroExit {
                code,
                stdout,
                stderr,
            }) => {
                assert_eq!(code, Some(4));
                assert_eq!(stdout.trim(), "partial");
                assert_eq!(stderr.trim(), "license expired");
            }
            other => panic!("expected NonZeroExit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_token_echoed_by_analyzer_is_scrubbed() {
        let fixture = fixture("echo \"auth=${12}\" >&2; exit 1");
        let analyzer = analyzer_for(&fixture, 10, "super-secret");

        let result = analyzer.invoke(Path::new("/srv/scan/G1"), 42).await;

        match result {
            Err(InvocationError::NonZeroExit { stderr, .. }) => {
                assert!(!stderr.contains("super-secret"));
                assert!(stderr.contains("<REDACTED>"));
            }
            other => panic!("expected NonZeroExit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_hung_analyzer_times_out() {
        let fixture = fixture("sleep 5");
        let analyzer = JavaAnalyzer::new(
            AnalyzerConfig {
                java_program: fixture.program.clone(),
                home_dir: fixture.home.clone(),
                timeout_seconds: 0,
                ..config()
            },
            "1234",
            "tok",
        );

        let result = analyzer.invoke(Path::new("/srv/scan/G1"), 42).await;
        assert!(matches!(result, Err(InvocationError::TimeoutExceeded { .. })));
    }

    #[tokio::test]
    async fn test_missing_launcher_is_launch_failure() {
        let analyzer = JavaAnalyzer::new(
            AnalyzerConfig {
                java_program: "/nonexistent/scan-relay-java".to_string(),
                home_dir: std::env::temp_dir(),
                ..config()
            },
            "1234",
            "tok",
        );

        let result = analyzer.invoke(Path::new("/srv/scan/G1"), 42).await;
        assert!(matches!(result, Err(InvocationError::LaunchFailure { .. })));
    }
}
