//! Build-system detection
//!
//! A checked-out repository is classified by the marker files at its root.
//! Markers are checked in a fixed priority order and the first match wins.

use std::path::Path;

use crate::command::CommandSpec;

/// Toolchain a project is built and tested with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectKind {
    Go,
    Make,
    /// Python project with a `requirements.txt`
    PythonRequirements,
    /// Python project with only a `setup.py`
    PythonSetup,
    Node,
}

/// Marker files in detection priority order.
pub const MARKERS: &[(&str, ProjectKind)] = &[
    ("go.mod", ProjectKind::Go),
    ("Makefile", ProjectKind::Make),
    ("requirements.txt", ProjectKind::PythonRequirements),
    ("setup.py", ProjectKind::PythonSetup),
    ("package.json", ProjectKind::Node),
];

impl ProjectKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProjectKind::Go => "go",
            ProjectKind::Make => "make",
            ProjectKind::PythonRequirements => "python (requirements.txt)",
            ProjectKind::PythonSetup => "python (setup.py)",
            ProjectKind::Node => "node",
        }
    }

    pub fn marker(&self) -> &'static str {
        match self {
            ProjectKind::Go => "go.mod",
            ProjectKind::Make => "Makefile",
            ProjectKind::PythonRequirements => "requirements.txt",
            ProjectKind::PythonSetup => "setup.py",
            ProjectKind::Node => "package.json",
        }
    }

    /// Program and arguments of the build step.
    pub fn build_command(&self) -> &'static [&'static str] {
        match self {
            ProjectKind::Go => &["go", "build", "./..."],
            ProjectKind::Make => &["make"],
            ProjectKind::PythonRequirements => &["pip", "install", "-r", "requirements.txt"],
            ProjectKind::PythonSetup => &["python", "setup.py", "install"],
            ProjectKind::Node => &["npm", "install"],
        }
    }

    /// Program and arguments of the test step, if the toolchain has one.
    pub fn test_command(&self) -> Option<&'static [&'static str]> {
        match self {
            ProjectKind::Go => Some(&["go", "test", "./..."][..]),
            ProjectKind::Make => Some(&["make", "test"][..]),
            ProjectKind::PythonRequirements => Some(&["pytest"][..]),
            ProjectKind::PythonSetup => None,
            ProjectKind::Node => Some(&["npm", "test"][..]),
        }
    }

    /// Classify `dir` by the highest-priority marker present.
    pub fn detect(dir: &Path) -> Option<ProjectKind> {
        Self::detect_where(dir, |_| true)
    }

    /// Classify `dir` for testing: only kinds that have a test command count,
    /// so a lower-priority marker can still provide one.
    pub fn detect_testable(dir: &Path) -> Option<ProjectKind> {
        Self::detect_where(dir, |kind| kind.test_command().is_some())
    }

    fn detect_where(dir: &Path, accept: impl Fn(ProjectKind) -> bool) -> Option<ProjectKind> {
        MARKERS
            .iter()
            .filter(|(_, kind)| accept(*kind))
            .find(|(marker, _)| dir.join(marker).exists())
            .map(|(_, kind)| *kind)
    }
}

/// Turn a static `[program, args..]` table entry into a command rooted at `dir`.
pub fn to_command(parts: &[&str], dir: &Path) -> CommandSpec {
    let mut parts = parts.iter().copied();
    let program = parts.next().unwrap_or_default();
    CommandSpec::new(program).args(parts).current_dir(dir)
}
