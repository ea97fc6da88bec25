//! End-to-end resolver runs against fake platform and Python tooling.

use std::collections::{BTreeSet, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use flate2::Compression;
use flate2::write::GzEncoder;
use wheelhouse_core::env::BuildEnv;
use wheelhouse_core::error::{BuildError, Result, VerifyError, WheelhouseError};
use wheelhouse_core::platform::{DependencyGuard, Platform, Setup, SetupContext};
use wheelhouse_core::python::{DownloadTarget, PythonTools};
use wheelhouse_core::resolver::BuildResult;
use wheelhouse_core::tags::TagUniverse;
use wheelhouse_core::{AvailabilityIndex, Manifest, ManifestEntry, Reporter, Resolver};
use wheelhouse_schema::{Arch, ProjectName, PythonVersion, Version, WheelFilename};
use zip::write::SimpleFileOptions;

type Members = Vec<(String, Vec<u8>)>;

fn members(list: &[(&str, &str)]) -> Members {
    list.iter()
        .map(|(n, d)| ((*n).to_string(), d.as_bytes().to_vec()))
        .collect()
}

fn write_wheel(path: &Path, members: &Members) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    for (name, data) in members {
        zip.start_file(name.as_str(), SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

fn write_sdist(path: &Path, members: &Members) {
    let gz = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    let mut tar = tar::Builder::new(gz);
    for (name, data) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        tar.append_data(&mut header, name, data.as_slice()).unwrap();
    }
    tar.into_inner().unwrap().finish().unwrap();
}

/// Native members hold the name of the architecture they were "built" for.
#[derive(Default)]
struct FakePlatform {
    installs: AtomicUsize,
    repairs: AtomicUsize,
}

impl Platform for FakePlatform {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn setup_dependencies(&self, _ctx: &SetupContext) -> Result<Setup> {
        Ok(Setup::Ready)
    }

    fn install<'env>(&self, _entry: &ManifestEntry, env: &'env mut BuildEnv) -> Result<DependencyGuard<'env>> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        Ok(DependencyGuard::new(env))
    }

    fn get_archs(&self, path: &Path) -> Result<BTreeSet<Arch>> {
        let contents = fs::read_to_string(path)?;
        Ok(contents.split_whitespace().filter_map(|a| a.parse().ok()).collect())
    }

    fn repair_wheel(&self, wheel: &Path, dest: &Path) -> Result<()> {
        self.repairs.fetch_add(1, Ordering::SeqCst);
        let name = wheel.file_name().unwrap().to_string_lossy();
        let repaired = name.replace("-linux_x86_64.whl", "-manylinux_2_17_x86_64.whl");
        fs::copy(wheel, dest.join(repaired))?;
        Ok(())
    }
}

/// Serves canned wheels and sdists keyed by requirement.
#[derive(Default)]
struct FakeTools {
    wheels: HashMap<(String, bool), (String, Members)>,
    sdists: HashMap<String, (String, Members)>,
    builds: HashMap<String, Members>,
    depends: HashMap<String, String>,
    broken_imports: BTreeSet<String>,
    downloads: AtomicUsize,
    compiles: AtomicUsize,
    installs: Mutex<Vec<(String, Vec<String>)>>,
    imports: Mutex<Vec<String>>,
}

impl FakeTools {
    fn wheel(mut self, requirement: &str, any_platform: bool, filename: &str, list: &[(&str, &str)]) -> Self {
        self.wheels.insert(
            (requirement.to_string(), any_platform),
            (filename.to_string(), members(list)),
        );
        self
    }

    fn sdist(mut self, requirement: &str, filename: &str, list: &[(&str, &str)]) -> Self {
        self.sdists
            .insert(requirement.to_string(), (filename.to_string(), members(list)));
        self
    }

    /// Wheel contents produced when compiling `requirement`'s sdist; the
    /// filename is derived like pip would, tagged `linux_x86_64` unless
    /// `pure`.
    fn builds(mut self, requirement: &str, list: &[(&str, &str)]) -> Self {
        self.builds.insert(requirement.to_string(), members(list));
        self
    }

    /// Installing any wheel of `name` needs `dependency` in find-links.
    fn depends(mut self, name: &str, dependency: &str) -> Self {
        self.depends.insert(name.to_string(), dependency.to_string());
        self
    }

    fn broken_import(mut self, module: &str) -> Self {
        self.broken_imports.insert(module.to_string());
        self
    }
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

impl PythonTools for FakeTools {
    fn download_wheel(
        &self,
        entry: &ManifestEntry,
        _python: PythonVersion,
        dest: &Path,
        target: DownloadTarget,
    ) -> Result<bool> {
        self.downloads.fetch_add(1, Ordering::SeqCst);
        let key = (entry.requirement(), target == DownloadTarget::AnyPlatform);
        match self.wheels.get(&key) {
            Some((filename, members)) => {
                write_wheel(&dest.join(filename), members);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn download_sdist(&self, entry: &ManifestEntry, _python: PythonVersion, dest: &Path, _env: &BuildEnv) -> Result<()> {
        let (filename, members) = self
            .sdists
            .get(&entry.requirement())
            .expect("sdist fixture");
        write_sdist(&dest.join(filename), members);
        Ok(())
    }

    fn build_wheel(
        &self,
        python: PythonVersion,
        sdist: &Path,
        _index_url: &str,
        wheel_dir: &Path,
        _env: &BuildEnv,
    ) -> Result<()> {
        self.compiles.fetch_add(1, Ordering::SeqCst);
        let stem = sdist.file_name().unwrap().to_string_lossy().replace(".tar.gz", "");
        let (name, version) = stem.rsplit_once('-').unwrap();
        let members = &self.builds[&format!("{name}=={version}")];
        let native = members.iter().any(|(n, _)| n.ends_with(".so"));
        let filename = if native {
            let cp = python.cp_tag();
            format!("{name}-{version}-{cp}-{cp}-linux_x86_64.whl")
        } else {
            format!("{name}-{version}-py3-none-any.whl")
        };
        write_wheel(&wheel_dir.join(filename), members);
        Ok(())
    }

    fn create_env(&self, _python: PythonVersion, venv: &Path) -> Result<()> {
        fs::create_dir_all(venv)?;
        Ok(())
    }

    fn install(&self, _venv: &Path, requirements: &[String], _index_url: &str, find_links: &Path) -> Result<()> {
        let wheel = Path::new(requirements[0].split('[').next().unwrap());
        assert!(wheel.is_file());
        let filename = wheel.file_name().unwrap().to_string_lossy().into_owned();
        let available = file_names(find_links);
        self.installs
            .lock()
            .unwrap()
            .push((filename.clone(), available.clone()));

        let name = filename.split('-').next().unwrap();
        match self.depends.get(name) {
            Some(dependency) if !available.contains(dependency) => Err(BuildError::Command {
                command: format!("pip install {filename}"),
                status: format!("exit status: 1 (no distribution for {dependency})"),
            }
            .into()),
            _ => Ok(()),
        }
    }

    fn import(&self, _venv: &Path, module: &str) -> Result<()> {
        self.imports.lock().unwrap().push(module.to_string());
        if self.broken_imports.contains(module) {
            return Err(BuildError::Command {
                command: format!("python -c __import__(\"{module}\")"),
                status: "exit status: 1".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[derive(Default)]
struct RecordingReporter {
    lines: Mutex<Vec<String>>,
}

impl RecordingReporter {
    fn push(&self, line: String) {
        self.lines.lock().unwrap().push(line);
    }

    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl Reporter for RecordingReporter {
    fn pair(&self, name: &ProjectName, version: &Version, python: PythonVersion) {
        self.push(format!("=== {name}=={version}@{python}"));
    }
    fn skipped(&self, name: &ProjectName, version: &Version, python: PythonVersion) {
        self.push(format!("skipped {name}=={version}@{python}"));
    }
    fn just_built(&self) {
        self.push("-> just built!".to_string());
    }
    fn building(&self) {
        self.push("-> building...".to_string());
    }
    fn downloaded(&self, filename: &str) {
        self.push(format!("-> downloaded! {filename}"));
    }
    fn built(&self, filename: &str) {
        self.push(format!("-> built! {filename}"));
    }
    fn ignored(&self, filename: &str, reason: &str) {
        self.push(format!("-> ignoring: {filename}\n{reason}"));
    }
    fn validating(&self, filename: &str, python: PythonVersion) {
        self.push(format!("validating {python}: {filename}"));
    }
    fn info(&self, msg: &str) {
        self.push(msg.to_string());
    }
    fn warning(&self, msg: &str) {
        self.push(format!("warning: {msg}"));
    }
    fn summary(&self, _count: usize, _action: &str, _elapsed_secs: f64) {}
}

fn py(minor: u32) -> PythonVersion {
    PythonVersion::new(3, minor)
}

fn universe() -> TagUniverse {
    TagUniverse::from_platforms(["manylinux_2_17_x86_64", "manylinux2014_x86_64", "linux_x86_64"])
}

fn ctx(dest: &Path, pythons: &[PythonVersion]) -> SetupContext {
    SetupContext {
        packages_ini: PathBuf::from("packages.ini"),
        dest: dest.to_path_buf(),
        pypi_url: "https://pypi.internal.example/".to_string(),
        pythons: pythons.to_vec(),
        no_validate: false,
    }
}

const INDEX: &str = "https://pypi.internal.example/simple";

#[test]
fn test_published_wheel_satisfies_every_interpreter() {
    let manifest = Manifest::parse("[foo==1.0]\n").unwrap();
    let mut index = AvailabilityIndex::with_published([WheelFilename::parse("foo-1.0-py3-none-any.whl").unwrap()]);
    let platform = FakePlatform::default();
    let tools = FakeTools::default();
    let reporter = RecordingReporter::default();
    let pythons = [py(11), py(12), py(13)];
    let dest = tempfile::tempdir().unwrap();

    let report = Resolver::new(&platform, &tools, &reporter, universe(), &pythons, INDEX)
        .run(&manifest, &mut index, dest.path(), &ctx(dest.path(), &pythons))
        .unwrap();

    assert_eq!(report.outcomes.len(), 3);
    assert!(report
        .outcomes
        .iter()
        .all(|o| o.result == BuildResult::AlreadySatisfied));
    assert_eq!(tools.downloads.load(Ordering::SeqCst), 0);
    assert_eq!(tools.compiles.load(Ordering::SeqCst), 0);
    assert_eq!(platform.installs.load(Ordering::SeqCst), 0);
    assert!(!reporter.lines().iter().any(|l| l.starts_with("===")));
}

#[test]
fn test_expected_binary_build_is_fatal() {
    let manifest = Manifest::parse("[bar==2.0]\n").unwrap();
    let mut index = AvailabilityIndex::new();
    let platform = FakePlatform::default();
    let tools = FakeTools::default()
        .sdist(
            "bar==2.0",
            "bar-2.0.tar.gz",
            &[("bar-2.0/setup.py", "setup()"), ("bar-2.0/src/_bar.c", "int x;")],
        )
        .builds("bar==2.0", &[("bar/__init__.py", "")]);
    let reporter = RecordingReporter::default();
    let pythons = [py(12)];
    let dest = tempfile::tempdir().unwrap();

    let err = Resolver::new(&platform, &tools, &reporter, universe(), &pythons, INDEX)
        .run(&manifest, &mut index, dest.path(), &ctx(dest.path(), &pythons))
        .unwrap_err()
        .to_string();

    assert!(err.contains("bar==2.0 expected binary as"), "{err}");
    assert!(err.contains(".c"), "{err}");
    assert_eq!(tools.downloads.load(Ordering::SeqCst), 2);
    assert_eq!(tools.compiles.load(Ordering::SeqCst), 1);
    assert_eq!(platform.installs.load(Ordering::SeqCst), 1);
    assert_eq!(fs::read_dir(dest.path()).unwrap().count(), 0);
}

#[test]
fn test_mistagged_download_falls_back_to_pure_wheel() {
    let manifest = Manifest::parse("[baz==1.0]\n").unwrap();
    let mut index = AvailabilityIndex::new();
    let platform = FakePlatform::default();
    let tools = FakeTools::default()
        .wheel(
            "baz==1.0",
            false,
            "baz-1.0-cp39-cp39-manylinux_2_17_x86_64.whl",
            &[("baz/__init__.py", ""), ("baz/_speedups.so", "aarch64")],
        )
        .wheel(
            "baz==1.0",
            true,
            "baz-1.0-py3-none-any.whl",
            &[
                ("baz/__init__.py", ""),
                ("baz-1.0.dist-info/RECORD", "baz/__init__.py,,\nbaz-1.0.dist-info/RECORD,,\n"),
            ],
        );
    let reporter = RecordingReporter::default();
    let pythons = [py(9), py(10)];
    let dest = tempfile::tempdir().unwrap();

    let report = Resolver::new(&platform, &tools, &reporter, universe(), &pythons, INDEX)
        .run(&manifest, &mut index, dest.path(), &ctx(dest.path(), &pythons))
        .unwrap();

    let pure = WheelFilename::parse("baz-1.0-py3-none-any.whl").unwrap();
    assert_eq!(report.outcomes[0].result, BuildResult::Downloaded(pure));
    assert_eq!(report.outcomes[1].result, BuildResult::AlreadySatisfied);
    assert_eq!(tools.compiles.load(Ordering::SeqCst), 0);
    assert!(dest.path().join("baz-1.0-py3-none-any.whl").is_file());
    assert!(!dest.path().join("baz-1.0-cp39-cp39-manylinux_2_17_x86_64.whl").exists());

    let lines = reporter.lines();
    let ignored = lines
        .iter()
        .find(|l| l.starts_with("-> ignoring: baz-1.0-cp39-cp39-manylinux_2_17_x86_64.whl"))
        .expect("rejection reported");
    assert!(ignored.contains("---> expected x86_64"), "{ignored}");
    assert!(ignored.contains("---> received aarch64"), "{ignored}");
    assert!(lines.iter().any(|l| l.starts_with("warning: baz==1.0")));
    assert!(lines.contains(&"-> just built!".to_string()));
    assert_eq!(tools.imports.lock().unwrap().as_slice(), ["baz", "baz"]);
}

#[test]
fn test_ignored_wheel_is_never_accepted() {
    let manifest = Manifest::parse("[baz==1.0]\nignore_wheels = baz-1.0-py3-none-any.whl\n").unwrap();
    let mut index = AvailabilityIndex::new();
    let platform = FakePlatform::default();
    let tools = FakeTools::default()
        .wheel("baz==1.0", true, "baz-1.0-py3-none-any.whl", &[("baz/__init__.py", "")])
        .sdist("baz==1.0", "baz-1.0.tar.gz", &[("baz-1.0/setup.py", "setup()")])
        .builds(
            "baz==1.0",
            &[
                ("baz/__init__.py", ""),
                ("baz-1.0.dist-info/RECORD", "baz/__init__.py,,\n"),
            ],
        );
    let reporter = RecordingReporter::default();
    let pythons = [py(12)];
    let dest = tempfile::tempdir().unwrap();

    let report = Resolver::new(&platform, &tools, &reporter, universe(), &pythons, INDEX)
        .run(&manifest, &mut index, dest.path(), &ctx(dest.path(), &pythons))
        .unwrap();

    assert_eq!(report.built_count(), 1);
    assert!(reporter
        .lines()
        .iter()
        .any(|l| l.starts_with("-> ignoring: baz-1.0-py3-none-any.whl")));
    // Pure builds skip repair.
    assert_eq!(platform.repairs.load(Ordering::SeqCst), 0);
}

#[test]
fn test_second_run_builds_nothing() {
    let manifest = Manifest::parse("[qux==1.0]\n\n[pure==0.1]\npython_versions = >=3.12\n").unwrap();
    let platform = FakePlatform::default();
    let tools = FakeTools::default()
        .sdist("qux==1.0", "qux-1.0.tar.gz", &[("qux-1.0/setup.py", "setup()"), ("qux-1.0/qux.c", "")])
        .builds(
            "qux==1.0",
            &[
                ("qux.cpython-3x.so", "x86_64"),
                ("qux-1.0.dist-info/RECORD", "qux.cpython-3x.so,,\n"),
            ],
        )
        .wheel(
            "pure==0.1",
            false,
            "pure-0.1-py3-none-any.whl",
            &[("pure.py", ""), ("pure-0.1.dist-info/RECORD", "pure.py,,\n")],
        );
    let reporter = RecordingReporter::default();
    let pythons = [py(11), py(12)];
    let dest = tempfile::tempdir().unwrap();
    let resolver = Resolver::new(&platform, &tools, &reporter, universe(), &pythons, INDEX);

    let mut index = AvailabilityIndex::new();
    let first = resolver
        .run(&manifest, &mut index, dest.path(), &ctx(dest.path(), &pythons))
        .unwrap();
    let produced: Vec<&str> = first.produced().map(|w| w.filename.as_str()).collect();
    assert_eq!(
        produced,
        vec![
            "qux-1.0-cp311-cp311-manylinux_2_17_x86_64.whl",
            "qux-1.0-cp312-cp312-manylinux_2_17_x86_64.whl",
            "pure-0.1-py3-none-any.whl",
        ]
    );
    // pure==0.1 excludes 3.11, so only three pairs ran.
    assert_eq!(first.outcomes.len(), 3);
    assert_eq!(platform.repairs.load(Ordering::SeqCst), 2);

    let downloads = tools.downloads.load(Ordering::SeqCst);
    let compiles = tools.compiles.load(Ordering::SeqCst);

    let mut published = AvailabilityIndex::with_published(first.produced().cloned());
    let second = resolver
        .run(&manifest, &mut published, dest.path(), &ctx(dest.path(), &pythons))
        .unwrap();
    assert_eq!(second.produced().count(), 0);
    assert_eq!(tools.downloads.load(Ordering::SeqCst), downloads);
    assert_eq!(tools.compiles.load(Ordering::SeqCst), compiles);
}

#[test]
fn test_dependency_later_in_manifest_is_available_to_verification() {
    let manifest = Manifest::parse("[aaa==1.0]\n\n[zzz==1.0]\n").unwrap();
    let mut index = AvailabilityIndex::new();
    let platform = FakePlatform::default();
    let tools = FakeTools::default()
        .wheel(
            "aaa==1.0",
            false,
            "aaa-1.0-py3-none-any.whl",
            &[("aaa.py", ""), ("aaa-1.0.dist-info/RECORD", "aaa.py,,\n")],
        )
        .wheel(
            "zzz==1.0",
            false,
            "zzz-1.0-py3-none-any.whl",
            &[("zzz.py", ""), ("zzz-1.0.dist-info/RECORD", "zzz.py,,\n")],
        )
        .depends("aaa", "zzz-1.0-py3-none-any.whl");
    let reporter = RecordingReporter::default();
    let pythons = [py(12)];
    let dest = tempfile::tempdir().unwrap();

    let report = Resolver::new(&platform, &tools, &reporter, universe(), &pythons, INDEX)
        .run(&manifest, &mut index, dest.path(), &ctx(dest.path(), &pythons))
        .unwrap();

    assert_eq!(report.downloaded_count(), 2);
    let both = vec![
        "aaa-1.0-py3-none-any.whl".to_string(),
        "zzz-1.0-py3-none-any.whl".to_string(),
    ];
    let installs = tools.installs.lock().unwrap().clone();
    assert_eq!(
        installs,
        vec![
            ("aaa-1.0-py3-none-any.whl".to_string(), both.clone()),
            ("zzz-1.0-py3-none-any.whl".to_string(), both),
        ]
    );

    // Every pair is resolved before the first wheel is validated.
    let lines = reporter.lines();
    let last_download = lines.iter().rposition(|l| l.starts_with("-> downloaded!")).unwrap();
    let first_validation = lines.iter().position(|l| l.starts_with("validating")).unwrap();
    assert!(last_download < first_validation, "{lines:?}");
}

#[test]
fn test_failed_import_stops_the_run() {
    let manifest = Manifest::parse("[qux==1.0]\n").unwrap();
    let mut index = AvailabilityIndex::new();
    let platform = FakePlatform::default();
    let tools = FakeTools::default()
        .wheel(
            "qux==1.0",
            false,
            "qux-1.0-py3-none-any.whl",
            &[
                ("qux/__init__.py", ""),
                ("qux_plugin.py", ""),
                ("qux-1.0.dist-info/RECORD", "qux/__init__.py,,\nqux_plugin.py,,\n"),
            ],
        )
        .broken_import("qux_plugin");
    let reporter = RecordingReporter::default();
    let pythons = [py(12)];
    let dest = tempfile::tempdir().unwrap();

    let err = Resolver::new(&platform, &tools, &reporter, universe(), &pythons, INDEX)
        .run(&manifest, &mut index, dest.path(), &ctx(dest.path(), &pythons))
        .unwrap_err();

    match &err {
        WheelhouseError::Verify(VerifyError::ImportFailed { module, python, .. }) => {
            assert_eq!(module, "qux_plugin");
            assert_eq!(*python, py(12));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("validate_skip_imports"), "{err}");
    assert_eq!(tools.imports.lock().unwrap().as_slice(), ["qux", "qux_plugin"]);
}

#[test]
fn test_no_validation_skips_install_and_import() {
    let manifest = Manifest::parse("[qux==1.0]\n").unwrap();
    let mut index = AvailabilityIndex::new();
    let platform = FakePlatform::default();
    let tools = FakeTools::default()
        .wheel("qux==1.0", false, "qux-1.0-py3-none-any.whl", &[("qux.py", "")])
        .broken_import("qux");
    let reporter = RecordingReporter::default();
    let pythons = [py(12)];
    let dest = tempfile::tempdir().unwrap();

    let report = Resolver::new(&platform, &tools, &reporter, universe(), &pythons, INDEX)
        .with_validation(false)
        .run(&manifest, &mut index, dest.path(), &ctx(dest.path(), &pythons))
        .unwrap();

    assert_eq!(report.downloaded_count(), 1);
    assert!(tools.installs.lock().unwrap().is_empty());
    assert!(tools.imports.lock().unwrap().is_empty());
}
