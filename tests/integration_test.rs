// tests/integration_test.rs

//! Integration tests for Relpac
//!
//! These tests publish small repositories on disk, serve them through
//! `file://` URLs and drive the package manager end to end.

use flate2::Compression;
use flate2::write::GzEncoder;
use relpac::packages::InstallReason;
use relpac::{Config, Error, InstallOutcome, PackageManager, UpdateOutcome};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use url::Url;

const REPO: &str = "minigalaxy";

#[derive(Clone, Copy, PartialEq)]
enum Checksums {
    Valid,
    WrongSha256,
    Missing,
}

struct TestPackage {
    name: &'static str,
    version: &'static str,
    depends: Vec<&'static str>,
    files: Vec<(String, String)>,
    checksums: Checksums,
}

fn package(name: &'static str, version: &'static str) -> TestPackage {
    TestPackage {
        name,
        version,
        depends: Vec::new(),
        files: vec![(
            format!("usr/share/{}/{}.txt", name, name),
            format!("{} {}\n", name, version),
        )],
        checksums: Checksums::Valid,
    }
}

impl TestPackage {
    fn depends(mut self, depends: &[&'static str]) -> Self {
        self.depends = depends.to_vec();
        self
    }

    fn file(mut self, path: &str, content: &str) -> Self {
        self.files.push((path.to_string(), content.to_string()));
        self
    }

    fn only_file(mut self, path: &str, content: &str) -> Self {
        self.files.clear();
        self.file(path, content)
    }

    fn checksums(mut self, checksums: Checksums) -> Self {
        self.checksums = checksums;
        self
    }

    fn filename(&self) -> String {
        format!("{}-{}-any.pkg.tar.gz", self.name, self.version)
    }
}

fn append(builder: &mut tar::Builder<GzEncoder<File>>, name: &str, data: &[u8]) {
    let mut header = tar::Header::new_gnu();
    if name.ends_with('/') {
        header.set_entry_type(tar::EntryType::Directory);
        header.set_mode(0o755);
    } else {
        header.set_entry_type(tar::EntryType::Regular);
        header.set_mode(0o644);
    }
    header.set_size(data.len() as u64);
    // Header::set_path refuses "..", so write the raw name bytes
    header.as_gnu_mut().unwrap().name[..name.len()].copy_from_slice(name.as_bytes());
    header.set_cksum();
    builder.append(&header, data).unwrap();
}

fn write_archive(path: &Path, entries: &[(String, Vec<u8>)]) {
    let file = File::create(path).unwrap();
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    for (name, data) in entries {
        append(&mut builder, name, data);
    }
    builder.into_inner().unwrap().finish().unwrap();
}

/// A repository server directory plus an install root to use it with
struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    fn new() -> Self {
        let repo = Self {
            dir: tempfile::tempdir().unwrap(),
        };
        fs::create_dir_all(repo.server()).unwrap();
        repo
    }

    fn server(&self) -> PathBuf {
        self.dir.path().join("server")
    }

    fn root(&self) -> PathBuf {
        self.dir.path().join("root")
    }

    fn db_path(&self) -> PathBuf {
        self.root().join("var/lib/relpac")
    }

    fn cache_dir(&self) -> PathBuf {
        self.root().join("var/cache/relpac")
    }

    fn config(&self) -> Config {
        let server = Url::from_directory_path(self.server()).unwrap();
        Config::new(self.root(), self.cache_dir(), self.db_path())
            .with_repository(REPO, server.as_str())
            .unwrap()
    }

    fn manager(&self) -> PackageManager {
        PackageManager::new(self.config()).unwrap()
    }

    /// Build package archives and the sync database for `packages`
    fn publish(&self, packages: &[TestPackage]) {
        let mut database = Vec::new();

        for pkg in packages {
            let mut entries = vec![(
                ".PKGINFO".to_string(),
                format!("pkgname = {}\npkgver = {}\n", pkg.name, pkg.version).into_bytes(),
            )];
            let mut directories = BTreeSet::new();
            for (path, _) in &pkg.files {
                let mut prefix = String::new();
                let segments: Vec<&str> = path.split('/').collect();
                for segment in &segments[..segments.len() - 1] {
                    prefix.push_str(segment);
                    prefix.push('/');
                    if !prefix.starts_with('.') {
                        directories.insert(prefix.clone());
                    }
                }
            }
            entries.extend(directories.into_iter().map(|d| (d, Vec::new())));
            entries.extend(
                pkg.files
                    .iter()
                    .map(|(path, content)| (path.clone(), content.clone().into_bytes())),
            );

            let archive = self.server().join(pkg.filename());
            write_archive(&archive, &entries);
            let bytes = fs::read(&archive).unwrap();

            let mut desc = format!(
                "%FILENAME%\n{}\n\n%NAME%\n{}\n\n%VERSION%\n{}\n\n%DESC%\n{} test package\n\n\
                 %CSIZE%\n{}\n\n%ISIZE%\n{}\n\n",
                pkg.filename(),
                pkg.name,
                pkg.version,
                pkg.name,
                bytes.len(),
                bytes.len() * 4,
            );
            match pkg.checksums {
                Checksums::Valid => {
                    desc.push_str(&format!("%MD5SUM%\n{:x}\n\n", md5::compute(&bytes)));
                    desc.push_str(&format!("%SHA256SUM%\n{:x}\n\n", Sha256::digest(&bytes)));
                }
                Checksums::WrongSha256 => {
                    desc.push_str(&format!("%SHA256SUM%\n{}\n\n", "0".repeat(64)));
                }
                Checksums::Missing => {}
            }
            desc.push_str("%ARCH%\nany\n\n");
            if !pkg.depends.is_empty() {
                desc.push_str(&format!("%DEPENDS%\n{}\n\n", pkg.depends.join("\n")));
            }

            database.push((
                format!("{}-{}/", pkg.name, pkg.version),
                Vec::new(),
            ));
            database.push((
                format!("{}-{}/desc", pkg.name, pkg.version),
                desc.into_bytes(),
            ));
        }

        write_archive(&self.server().join(format!("{}.db", REPO)), &database);
    }
}

fn names(manager: &PackageManager) -> Vec<String> {
    manager.installed().into_iter().map(|p| p.name).collect()
}

#[test]
fn test_install_pulls_in_dependencies() {
    let repo = TestRepo::new();
    repo.publish(&[package("foo", "1.0-1").depends(&["bar>=1.0"]), package("bar", "1.0-1")]);

    let mut manager = repo.manager();
    let outcome = manager.install("foo", true).unwrap();
    assert_eq!(
        outcome,
        InstallOutcome::Installed(vec!["bar".to_string(), "foo".to_string()])
    );

    let listed: Vec<String> = manager.installed().iter().map(|p| p.to_string()).collect();
    assert_eq!(listed, vec!["bar 1.0-1", "foo 1.0-1"]);

    let local = manager.local_database();
    let foo = local.get_descriptor("foo").unwrap().unwrap();
    let bar = local.get_descriptor("bar").unwrap().unwrap();
    assert_eq!(foo.reason(), InstallReason::Explicit);
    assert_eq!(bar.reason(), InstallReason::Dependency);
    assert_eq!(foo.validation(), ["md5".to_string(), "sha256".to_string()]);

    assert_eq!(
        fs::read_to_string(repo.root().join("usr/share/foo/foo.txt")).unwrap(),
        "foo 1.0-1\n"
    );
    assert!(repo.root().join("usr/share/bar/bar.txt").exists());
    assert!(!repo.root().join(".PKGINFO").exists());
    assert!(repo.cache_dir().join("pkg/foo-1.0-1-any.pkg.tar.gz").exists());
    assert!(repo.db_path().join("local/ALPM_DB_VERSION").exists());
}

#[test]
fn test_install_twice_is_idempotent() {
    let repo = TestRepo::new();
    repo.publish(&[package("foo", "1.0-1")]);

    let mut manager = repo.manager();
    manager.install("foo", true).unwrap();
    let second = manager.install("foo", true).unwrap();
    assert!(matches!(second, InstallOutcome::AlreadySatisfied(v) if v.as_str() == "1.0-1"));
    assert_eq!(names(&manager), vec!["foo"]);

    // A fresh manager reading the same root agrees
    let mut manager = repo.manager();
    assert!(matches!(
        manager.install("foo", true).unwrap(),
        InstallOutcome::AlreadySatisfied(_)
    ));
    let records = fs::read_dir(repo.db_path().join("local"))
        .unwrap()
        .filter(|e| e.as_ref().unwrap().path().is_dir())
        .count();
    assert_eq!(records, 1);
}

#[test]
fn test_stale_database_is_synchronized_again() {
    let repo = TestRepo::new();
    repo.publish(&[package("foo", "1.0-1")]);

    let config = repo.config().with_refresh_after(Duration::from_millis(1));
    let mut manager = PackageManager::new(config).unwrap();
    manager.install("foo", true).unwrap();

    repo.publish(&[package("foo", "1.0-2")]);
    std::thread::sleep(Duration::from_millis(50));

    assert_eq!(manager.sync(false).unwrap(), 1);
    assert_eq!(manager.update_candidates().unwrap(), vec!["foo"]);
}

#[test]
fn test_recent_database_is_not_synchronized() {
    let repo = TestRepo::new();
    repo.publish(&[package("foo", "1.0-1")]);

    let mut manager = repo.manager();
    assert_eq!(manager.sync(false).unwrap(), 1);

    repo.publish(&[package("foo", "1.0-2")]);
    assert_eq!(manager.sync(false).unwrap(), 0);
    assert!(manager.update_candidates().unwrap().is_empty());
}

#[test]
fn test_update_replaces_files_and_version() {
    let repo = TestRepo::new();
    repo.publish(&[package("foo", "1.0-1").only_file("usr/share/foo/old.txt", "old\n")]);

    let mut manager = repo.manager();
    manager.install("foo", true).unwrap();
    assert!(repo.root().join("usr/share/foo/old.txt").exists());

    repo.publish(&[package("foo", "1.0-2").only_file("usr/share/foo/new.txt", "new\n")]);
    manager.sync(true).unwrap();

    let before = manager
        .local_database()
        .get_package_version("foo")
        .cloned()
        .unwrap();
    let outcome = manager.update("foo").unwrap();
    assert!(matches!(
        &outcome,
        UpdateOutcome::Updated { from, to } if from.as_str() == "1.0-1" && to.as_str() == "1.0-2"
    ));

    let after = manager.local_database().get_package_version("foo").unwrap();
    assert!(*after >= before);
    assert_eq!(after.as_str(), "1.0-2");
    assert!(!repo.root().join("usr/share/foo/old.txt").exists());
    assert_eq!(
        fs::read_to_string(repo.root().join("usr/share/foo/new.txt")).unwrap(),
        "new\n"
    );
    assert!(!repo.db_path().join("local/foo-1.0-1").exists());
    assert!(repo.db_path().join("local/foo-1.0-2/desc").exists());

    // Already current now
    assert!(matches!(
        manager.update("foo").unwrap(),
        UpdateOutcome::AlreadyCurrent(v) if v.as_str() == "1.0-2"
    ));
}

#[test]
fn test_update_keeps_install_reason() {
    let repo = TestRepo::new();
    repo.publish(&[package("foo", "1.0-1").depends(&["bar"]), package("bar", "1.0-1")]);

    let mut manager = repo.manager();
    manager.install("foo", true).unwrap();

    repo.publish(&[package("foo", "1.0-1").depends(&["bar"]), package("bar", "1.1-1")]);
    manager.sync(true).unwrap();

    let updated = manager.update_all(None).unwrap();
    assert_eq!(updated, vec!["bar"]);

    let bar = manager.local_database().get_descriptor("bar").unwrap().unwrap();
    assert_eq!(bar.version().as_str(), "1.1-1");
    assert_eq!(bar.reason(), InstallReason::Dependency);

    assert!(manager.update_all(None).unwrap().is_empty());
}

#[test]
fn test_update_all_stops_at_first_failure() {
    let repo = TestRepo::new();
    repo.publish(&[package("foo", "1.0-1")]);

    let mut manager = repo.manager();
    manager.install("foo", true).unwrap();

    let names = vec!["missing".to_string(), "foo".to_string()];
    let err = manager.update_all(Some(&names)).unwrap_err();
    assert!(matches!(
        err,
        Error::UpdateFailed { ref package, ref source }
            if package == "missing" && matches!(**source, Error::NotInstalled(_))
    ));
}

#[test]
fn test_checksum_mismatch_fails_install() {
    let repo = TestRepo::new();
    repo.publish(&[package("foo", "1.0-1").checksums(Checksums::WrongSha256)]);

    let mut manager = repo.manager();
    let err = manager.install("foo", true).unwrap_err();
    assert!(matches!(err, Error::ChecksumMismatch { algorithm: "SHA-256", .. }));

    assert!(!repo.cache_dir().join("pkg/foo-1.0-1-any.pkg.tar.gz").exists());
    assert!(!manager.local_database().is_installed("foo"));
    assert!(names(&manager).is_empty());
}

#[test]
fn test_missing_checksum_policy() {
    let repo = TestRepo::new();
    repo.publish(&[package("foo", "1.0-1").checksums(Checksums::Missing)]);

    let strict = repo.config().with_required_checksums(true);
    let mut manager = PackageManager::new(strict).unwrap();
    assert!(matches!(
        manager.install("foo", true),
        Err(Error::MissingChecksum(name)) if name == "foo"
    ));

    let mut manager = repo.manager();
    manager.install("foo", true).unwrap();
    let foo = manager.local_database().get_descriptor("foo").unwrap().unwrap();
    assert_eq!(foo.validation(), ["none".to_string()]);
}

#[test]
fn test_traversal_entry_fails_install() {
    let repo = TestRepo::new();
    repo.publish(&[package("evil", "1.0-1").file("../../../etc/cron.d/evil", "* * * * * root id\n")]);

    let mut manager = repo.manager();
    let err = manager.install("evil", true).unwrap_err();
    match err {
        Error::IncompleteExtraction { package, missing } => {
            assert_eq!(package, "evil");
            assert_eq!(missing, vec!["../../../etc/cron.d/evil"]);
        }
        other => panic!("unexpected error: {}", other),
    }

    assert!(!manager.local_database().is_installed("evil"));
    assert!(!repo.dir.path().join("etc/cron.d/evil").exists());
    assert!(!repo.root().join("etc/cron.d/evil").exists());
}

#[test]
fn test_remove_deletes_files_and_record() {
    let repo = TestRepo::new();
    repo.publish(&[package("foo", "1.0-1").depends(&["bar"]), package("bar", "1.0-1")]);

    let mut manager = repo.manager();
    manager.install("foo", true).unwrap();
    fs::write(repo.root().join("usr/share/keep.txt"), "not packaged").unwrap();

    // Removing a dependency of an installed package is allowed
    let summary = manager.remove("bar").unwrap();
    assert_eq!(summary.removed_files, 1);
    assert!(summary.missing.is_empty());
    assert!(!repo.root().join("usr/share/bar").exists());
    assert!(repo.root().join("usr/share/foo/foo.txt").exists());
    assert!(repo.root().join("usr/share/keep.txt").exists());
    assert_eq!(names(&manager), vec!["foo"]);

    assert!(matches!(manager.remove("bar"), Err(Error::NotInstalled(_))));
}

#[test]
fn test_missing_package_and_dependency() {
    let repo = TestRepo::new();
    repo.publish(&[package("foo", "1.0-1").depends(&["ghost"])]);

    let mut manager = repo.manager();
    assert!(matches!(
        manager.install("nothing", true),
        Err(Error::PackageNotFound(name)) if name == "nothing"
    ));

    let err = manager.install("foo", true).unwrap_err();
    assert!(matches!(
        err,
        Error::DependencyFailed { ref package, ref dependency, ref source }
            if package == "foo"
                && dependency == "ghost"
                && matches!(**source, Error::PackageNotFound(_))
    ));
    assert!(names(&manager).is_empty());
}

#[test]
fn test_dependency_cycle_is_detected() {
    let repo = TestRepo::new();
    repo.publish(&[
        package("foo", "1.0-1").depends(&["bar"]),
        package("bar", "1.0-1").depends(&["baz"]),
        package("baz", "1.0-1").depends(&["foo"]),
    ]);

    let mut manager = repo.manager();
    let err = manager.install("foo", true).unwrap_err();
    match err {
        Error::DependencyCycle(cycle) => assert_eq!(cycle, vec!["foo", "bar", "baz", "foo"]),
        other => panic!("unexpected error: {}", other),
    }
    assert!(names(&manager).is_empty());
}

#[test]
fn test_shared_dependency_installed_once() {
    let repo = TestRepo::new();
    repo.publish(&[
        package("app", "1.0-1").depends(&["left", "right"]),
        package("left", "1.0-1").depends(&["common"]),
        package("right", "1.0-1").depends(&["common"]),
        package("common", "1.0-1"),
    ]);

    let mut manager = repo.manager();
    let outcome = manager.install("app", true).unwrap();
    assert_eq!(
        outcome,
        InstallOutcome::Installed(vec![
            "common".to_string(),
            "left".to_string(),
            "right".to_string(),
            "app".to_string(),
        ])
    );
}

#[test]
fn test_list_search_and_show() {
    let repo = TestRepo::new();
    repo.publish(&[package("foo", "1.0-1"), package("foobar", "2.0-1"), package("bar", "1.0-1")]);

    let mut manager = repo.manager();
    let listed: Vec<String> = manager.list("").unwrap().iter().map(|p| p.to_string()).collect();
    assert_eq!(listed, vec!["bar 1.0-1", "foo 1.0-1", "foobar 2.0-1"]);
    assert_eq!(manager.list(REPO).unwrap().len(), 3);
    assert!(matches!(manager.list("nope"), Err(Error::RepositoryNotFound(_))));

    let found: Vec<String> = manager.search("foo").unwrap().into_iter().map(|p| p.name).collect();
    assert_eq!(found, vec!["foo", "foobar"]);

    let report = manager.show("foo").unwrap().unwrap();
    assert!(report.contains("Repository      : minigalaxy"));
    assert!(report.contains("Name            : foo\n"));
    assert!(!report.contains("foobar"));
    assert!(manager.show("ghost").unwrap().is_none());

    let all = manager.show("").unwrap().unwrap();
    assert_eq!(all.matches("Name            :").count(), 3);
}

#[test]
fn test_show_installed_and_files() {
    let repo = TestRepo::new();
    repo.publish(&[package("foo", "1.0-1")]);

    let mut manager = repo.manager();
    manager.install("foo", true).unwrap();

    let report = manager.show_installed("foo").unwrap().unwrap();
    assert!(report.contains("Install Reason  : Explicitly installed"));
    assert!(report.contains("Install Date    : "));

    let manifest = manager.files("foo").unwrap();
    assert_eq!(
        manifest.files(),
        ["usr/", "usr/share/", "usr/share/foo/", "usr/share/foo/foo.txt"]
    );
    assert!(matches!(manager.files("bar"), Err(Error::NotInstalled(_))));
}

#[test]
fn test_show_installed_without_name_reports_everything() {
    let repo = TestRepo::new();
    repo.publish(&[package("foo", "1.0-1").depends(&["bar"]), package("bar", "1.0-1")]);

    let mut manager = repo.manager();
    assert!(manager.show_installed("").unwrap().is_none());

    manager.install("foo", true).unwrap();
    let report = manager.show_installed("").unwrap().unwrap();
    let bar = report.find("Name            : bar\n").unwrap();
    let foo = report.find("Name            : foo\n").unwrap();
    assert!(bar < foo);
    assert!(report.contains("Install Reason  : Installed as a dependency for another package"));
}

#[test]
fn test_config_file_end_to_end() {
    let repo = TestRepo::new();
    repo.publish(&[package("foo", "1.0-1")]);

    let base = repo.dir.path().join("psp");
    fs::create_dir_all(base.join("etc")).unwrap();
    let server = Url::from_directory_path(repo.server()).unwrap();
    fs::write(
        base.join("etc/relpac.conf"),
        format!(
            "[options]\nRootDir = root\nRefreshAfter = 60\n\n[{}]\nServer = {}\n",
            REPO, server
        ),
    )
    .unwrap();

    let config = Config::discover(&base).unwrap();
    assert_eq!(config.root_dir, base.join("root"));
    assert_eq!(config.db_path, base.join("root/var/lib/relpac"));

    let mut manager = PackageManager::new(config).unwrap();
    manager.install("foo", true).unwrap();
    assert!(base.join("root/usr/share/foo/foo.txt").exists());
    assert!(base.join("root/var/lib/relpac/sync/minigalaxy.db").exists());
}
