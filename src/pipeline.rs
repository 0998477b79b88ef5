//! The CI pipeline: clone, build, test, docker build, scan.

use std::path::Path;
use std::time::Instant;
use tracing::{error, info};

use crate::command::{CommandRunner, RunLimits};
use crate::context::BuildContext;
use crate::PipelineConfig;
use crate::docker::{build_image, remove_image, scan_image};
use crate::error::{CicdError, Result, StageError};
use crate::git::clone_repository;
use crate::project::{ProjectKind, to_command};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Clone,
    Build,
    Test,
    DockerBuild,
    Scan,
}

impl Stage {
    /// Stages in execution order.
    pub const ALL: [Stage; 5] = [
        Stage::Clone,
        Stage::Build,
        Stage::Test,
        Stage::DockerBuild,
        Stage::Scan,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Clone => "clone",
            Stage::Build => "build",
            Stage::Test => "test",
            Stage::DockerBuild => "docker build",
            Stage::Scan => "scan",
        }
    }

    /// Prefix of the error message returned to the webhook caller.
    pub fn failure_prefix(&self) -> &'static str {
        match self {
            Stage::Clone => "Error cloning repository",
            Stage::Build => "Build failed",
            Stage::Test => "Tests failed",
            Stage::DockerBuild => "Docker build failed",
            Stage::Scan => "Trivy scan failed",
        }
    }
}

/// Build the project in `dir` with the toolchain its markers select.
pub async fn build_project(
    runner: &dyn CommandRunner,
    dir: &Path,
    limits: &RunLimits,
) -> Result<ProjectKind> {
    let kind = ProjectKind::detect(dir).ok_or(CicdError::UnsupportedBuildSystem)?;
    info!("Detected {} project ({})", kind.name(), kind.marker());
    runner
        .run(&to_command(kind.build_command(), dir), limits)
        .await?;
    Ok(kind)
}

/// Run the test suite of the project in `dir`.
pub async fn run_tests(
    runner: &dyn CommandRunner,
    dir: &Path,
    limits: &RunLimits,
) -> Result<ProjectKind> {
    let kind = ProjectKind::detect_testable(dir).ok_or(CicdError::NoTestCommand)?;
    let Some(test_command) = kind.test_command() else {
        return Err(CicdError::NoTestCommand);
    };
    runner.run(&to_command(test_command, dir), limits).await?;
    Ok(kind)
}

/// Run every stage for `ctx` in order, stopping at the first failure. Once the
/// image is built it is removed again, whatever the scan says, unless
/// `keep_images` is set.
pub async fn run_pipeline(
    runner: &dyn CommandRunner,
    ctx: &BuildContext,
    config: &PipelineConfig,
    limits: &RunLimits,
) -> std::result::Result<(), StageError> {
    info!(
        "Run {} - starting pipeline for '{}' in '{}'",
        ctx.run_id,
        ctx.repo_url,
        ctx.work_dir().display()
    );

    let mut outcome = Ok(());
    let mut image_built = false;
    for stage in Stage::ALL {
        let started = Instant::now();
        let result = match stage {
            Stage::Clone => clone_repository(runner, &ctx.repo_url, ctx.work_dir(), limits).await,
            Stage::Build => build_project(runner, ctx.work_dir(), limits).await.map(|_| ()),
            Stage::Test => run_tests(runner, ctx.work_dir(), limits).await.map(|_| ()),
            Stage::DockerBuild => build_image(runner, ctx, limits).await,
            Stage::Scan => {
                scan_image(runner, &ctx.image_tag, config.scan_severity.as_deref(), limits).await
            }
        };

        if let Err(e) = result {
            let err = StageError::new(stage, e);
            error!("Run {} - {}", ctx.run_id, err);
            outcome = Err(err);
            break;
        }
        image_built |= stage == Stage::DockerBuild;
        info!(
            "Run {} - stage '{}' finished in {} ms",
            ctx.run_id,
            stage.name(),
            started.elapsed().as_millis()
        );
    }

    if image_built && !config.keep_images {
        remove_image(runner, &ctx.image_tag).await;
    }

    if outcome.is_ok() {
        info!("Run {} completed successfully.", ctx.run_id);
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PipelineConfig;
    use crate::testing::FakeRunner;
    use tempfile::TempDir;

    fn setup() -> (TempDir, BuildContext) {
        let root = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            workspace_root: Some(root.path().to_path_buf()),
            ..PipelineConfig::default()
        };
        let ctx = BuildContext::new("https://github.com/user/repo.git", &config);
        (root, ctx)
    }

    fn go_fixture() -> FakeRunner {
        FakeRunner::new()
            .with_file("go.mod", "module example.com/app\n")
            .with_file("main_test.go", "package main\n")
            .with_file("Dockerfile", "FROM golang:1.22\n")
    }

    #[tokio::test]
    async fn go_project_runs_all_stages_in_order() {
        let (_root, ctx) = setup();
        let runner = go_fixture();

        run_pipeline(&runner, &ctx, &PipelineConfig::default(), &RunLimits::unbounded())
            .await
            .unwrap();

        assert_eq!(
            runner.command_lines(),
            vec![
                format!("git clone -- {} {}", ctx.repo_url, ctx.work_dir().display()),
                "go build ./...".to_string(),
                "go test ./...".to_string(),
                format!("docker build -t {} {}", ctx.image_tag, ctx.work_dir().display()),
                format!("trivy image --no-progress {}", ctx.image_tag),
                format!("docker rmi {}", ctx.image_tag),
            ]
        );
        let calls = runner.calls();
        assert_eq!(calls[1].current_dir.as_deref(), Some(ctx.work_dir()));
        assert_eq!(calls[2].current_dir.as_deref(), Some(ctx.work_dir()));
    }

    #[tokio::test]
    async fn failing_tests_stop_before_docker() {
        let (_root, ctx) = setup();
        let runner = go_fixture().fail_on("go test");

        let err = run_pipeline(&runner, &ctx, &PipelineConfig::default(), &RunLimits::unbounded())
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::Test);
        assert!(err.to_string().starts_with("Tests failed: "));
        assert_eq!(runner.programs(), vec!["git", "go", "go"]);
    }

    #[tokio::test]
    async fn failed_scan_still_removes_image() {
        let (_root, ctx) = setup();
        let runner = go_fixture().fail_on("trivy");

        let err = run_pipeline(&runner, &ctx, &PipelineConfig::default(), &RunLimits::unbounded())
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::Scan);
        assert_eq!(
            runner.command_lines().last(),
            Some(&format!("docker rmi {}", ctx.image_tag))
        );
    }

    #[tokio::test]
    async fn keep_images_skips_removal() {
        let (_root, ctx) = setup();
        let runner = go_fixture();
        let config = PipelineConfig {
            keep_images: true,
            ..PipelineConfig::default()
        };

        run_pipeline(&runner, &ctx, &config, &RunLimits::unbounded())
            .await
            .unwrap();
        assert_eq!(runner.programs(), vec!["git", "go", "go", "docker", "trivy"]);
    }

    #[tokio::test]
    async fn unknown_project_aborts_at_build() {
        let (_root, ctx) = setup();
        let runner = FakeRunner::new().with_file("Dockerfile", "FROM scratch\n");

        let err = run_pipeline(&runner, &ctx, &PipelineConfig::default(), &RunLimits::unbounded())
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::Build);
        assert!(matches!(err.source, CicdError::UnsupportedBuildSystem));
        assert_eq!(runner.programs(), vec!["git"]);
    }

    #[tokio::test]
    async fn missing_dockerfile_never_scans() {
        let (_root, ctx) = setup();
        let runner = FakeRunner::new().with_file("Makefile", "all:\n");

        let err = run_pipeline(&runner, &ctx, &PipelineConfig::default(), &RunLimits::unbounded())
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::DockerBuild);
        assert_eq!(err.to_string(), "Docker build failed: Dockerfile not found");
        assert_eq!(runner.command_lines()[1..], ["make", "make test"]);
    }

    #[tokio::test]
    async fn clone_failure_is_reported_as_clone_stage() {
        let (_root, ctx) = setup();
        let runner = go_fixture().fail_on("git clone");

        let err = run_pipeline(&runner, &ctx, &PipelineConfig::default(), &RunLimits::unbounded())
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::Clone);
        assert!(err.to_string().starts_with("Error cloning repository: "));
        assert_eq!(runner.programs(), vec!["git"]);
    }

    #[tokio::test]
    async fn build_dispatches_only_highest_priority_toolchain() {
        let dir = tempfile::tempdir().unwrap();
        for marker in ["go.mod", "Makefile", "package.json"] {
            std::fs::write(dir.path().join(marker), "").unwrap();
        }
        let runner = FakeRunner::new();

        let kind = build_project(&runner, dir.path(), &RunLimits::unbounded())
            .await
            .unwrap();
        assert_eq!(kind, ProjectKind::Go);
        assert_eq!(runner.command_lines(), vec!["go build ./..."]);
    }

    #[tokio::test]
    async fn python_requirements_install_and_pytest() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("requirements.txt"), "requests\n").unwrap();
        let runner = FakeRunner::new();
        let limits = RunLimits::unbounded();

        build_project(&runner, dir.path(), &limits).await.unwrap();
        run_tests(&runner, dir.path(), &limits).await.unwrap();
        assert_eq!(
            runner.command_lines(),
            vec!["pip install -r requirements.txt", "pytest"]
        );
    }

    #[tokio::test]
    async fn no_marker_means_no_test_command() {
        let dir = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new();

        let err = run_tests(&runner, dir.path(), &RunLimits::unbounded())
            .await
            .unwrap_err();
        assert!(matches!(err, CicdError::NoTestCommand));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn stages_are_ordered() {
        let names: Vec<_> = Stage::ALL.iter().map(Stage::name).collect();
        assert_eq!(names, ["clone", "build", "test", "docker build", "scan"]);
    }
}
