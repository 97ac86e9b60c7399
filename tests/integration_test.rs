// tests/integration_test.rs

//! Integration tests for zif
//!
//! These tests drive repositories end to end through the public API, with
//! an in-memory transport standing in for HTTP.

use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use zif::version::compare_evr;
use zif::{
    Cancellable, Config, Error, Fetcher, InstalledPackages, Package, PackageIdentity,
    RemoteRepository, RepositorySet, Result,
};

/// Serves canned bodies and records every URL asked for
#[derive(Default)]
struct StaticFetcher {
    bodies: Mutex<HashMap<String, Vec<u8>>>,
    log: Mutex<Vec<String>>,
}

impl StaticFetcher {
    fn serve(&self, url: &str, body: &[u8]) {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), body.to_vec());
    }

    fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

impl Fetcher for StaticFetcher {
    fn fetch(&self, url: &str, dest: &Path, _cancel: &Cancellable) -> Result<()> {
        self.log.lock().unwrap().push(url.to_string());
        let body = self
            .bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| Error::DownloadError(format!("HTTP 404 from {}", url)))?;
        fs::write(dest, body)?;
        Ok(())
    }
}

fn sha256(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn bzip2(data: &[u8]) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn sqlite(sql: &str) -> Vec<u8> {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.sqlite");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(sql).unwrap();
    drop(conn);
    fs::read(&path).unwrap()
}

const PRIMARY_SQL: &str = "
    CREATE TABLE packages (pkgKey INTEGER PRIMARY KEY, pkgId TEXT, name TEXT, arch TEXT,
        version TEXT, epoch TEXT, release TEXT, summary TEXT, description TEXT, url TEXT,
        rpm_license TEXT, rpm_group TEXT, size_package INTEGER, location_href TEXT);
    CREATE TABLE requires (name TEXT, flags TEXT, epoch TEXT, version TEXT, release TEXT, pkgKey INTEGER);
    CREATE TABLE provides (name TEXT, flags TEXT, epoch TEXT, version TEXT, release TEXT, pkgKey INTEGER);
    CREATE TABLE conflicts (name TEXT, flags TEXT, epoch TEXT, version TEXT, release TEXT, pkgKey INTEGER);
    CREATE TABLE obsoletes (name TEXT, flags TEXT, epoch TEXT, version TEXT, release TEXT, pkgKey INTEGER);
    INSERT INTO packages VALUES (1, 'p1', 'PackageKit', 'i386', '0.5.4', '0', '1.fc12',
        'Package management service', 'PackageKit is a D-Bus abstraction layer',
        'http://www.packagekit.org', 'GPLv2+', 'System Environment/Libraries', 1500000,
        'Packages/PackageKit-0.5.4-1.fc12.i386.rpm');
    INSERT INTO packages VALUES (2, 'p2', 'PackageKit', 'i386', '0.5.5', '0', '1.fc12',
        'Package management service', 'PackageKit is a D-Bus abstraction layer',
        'http://www.packagekit.org', 'GPLv2+', 'System Environment/Libraries', 1510000,
        'Packages/PackageKit-0.5.5-1.fc12.i386.rpm');
    INSERT INTO packages VALUES (3, 'p3', 'gnome-packagekit', 'i386', '2.28.1', '0', '1.fc12',
        'Session applications to manage packages', 'GNOME frontend for PackageKit', NULL,
        'GPLv2+', 'Applications/System', 3200000,
        'Packages/gnome-packagekit-2.28.1-1.fc12.i386.rpm');
    INSERT INTO requires VALUES ('PackageKit', 'GE', '0', '0.5.0', NULL, 3);
    INSERT INTO provides VALUES ('PackageKit', 'EQ', '0', '0.5.5', '1.fc12', 2);
";

const FILELISTS_SQL: &str = "
    CREATE TABLE packages (pkgKey INTEGER PRIMARY KEY, pkgId TEXT);
    CREATE TABLE filelist (pkgKey INTEGER, dirname TEXT, filenames TEXT, filetypes TEXT);
    INSERT INTO packages VALUES (1, 'p1');
    INSERT INTO packages VALUES (2, 'p2');
    INSERT INTO packages VALUES (3, 'p3');
    INSERT INTO filelist VALUES (2, '/usr/sbin', 'packagekitd', 'f');
    INSERT INTO filelist VALUES (3, '/usr/bin', 'gpk-application/gpk-update-viewer', 'ff');
";

const COMPS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<comps>
  <group>
    <id>admin-tools</id>
    <name>Administration Tools</name>
    <description>Graphical system administration tools.</description>
    <uservisible>true</uservisible>
    <packagelist>
      <packagereq type="default">PackageKit</packagereq>
      <packagereq type="default">gnome-packagekit</packagereq>
    </packagelist>
  </group>
  <category>
    <id>system</id>
    <name>Base System</name>
    <grouplist>
      <groupid>admin-tools</groupid>
    </grouplist>
  </category>
</comps>
"#;

fn data_entry(data_type: &str, location: &str, compressed: &[u8], open: &[u8]) -> String {
    format!(
        "  <data type=\"{}\">\n    <location href=\"{}\"/>\n    <checksum type=\"sha256\">{}</checksum>\n    <timestamp>1257174288</timestamp>\n    <open-checksum type=\"sha256\">{}</open-checksum>\n  </data>\n",
        data_type,
        location,
        sha256(compressed),
        sha256(open)
    )
}

fn serve_repo(fetcher: &StaticFetcher, base_url: &str) {
    let primary = sqlite(PRIMARY_SQL);
    let filelists = sqlite(FILELISTS_SQL);
    let primary_bz2 = bzip2(&primary);
    let filelists_bz2 = bzip2(&filelists);
    let comps_gz = gzip(COMPS.as_bytes());

    let repomd = format!(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<repomd xmlns=\"http://linux.duke.edu/metadata/repo\">\n{}{}{}</repomd>\n",
        data_entry("primary_db", "repodata/primary.sqlite.bz2", &primary_bz2, &primary),
        data_entry("filelists_db", "repodata/filelists.sqlite.bz2", &filelists_bz2, &filelists),
        data_entry("group_gz", "repodata/comps.xml.gz", &comps_gz, COMPS.as_bytes()),
    );

    fetcher.serve(&format!("{}/repodata/repomd.xml", base_url), repomd.as_bytes());
    fetcher.serve(&format!("{}/repodata/primary.sqlite.bz2", base_url), &primary_bz2);
    fetcher.serve(&format!("{}/repodata/filelists.sqlite.bz2", base_url), &filelists_bz2);
    fetcher.serve(&format!("{}/repodata/comps.xml.gz", base_url), &comps_gz);
}

const BASE_URL: &str = "http://download.example.org/fedora/12/i386/os";

const FEDORA_REPO: &str = "\
[fedora]
name=Fedora $releasever - $basearch
baseurl=http://download.example.org/fedora/$releasever/$basearch/os
enabled=1
";

struct System {
    root: TempDir,
    fetcher: Arc<StaticFetcher>,
}

impl System {
    fn new(repo_file: &str) -> Self {
        let root = tempfile::tempdir().unwrap();
        let repos = root.path().join("yum.repos.d");
        fs::create_dir(&repos).unwrap();
        fs::write(repos.join("fedora.repo"), repo_file).unwrap();
        Self {
            root,
            fetcher: Arc::new(StaticFetcher::default()),
        }
    }

    fn config(&self, online: bool) -> Arc<Config> {
        let config = Config::parse(&format!(
            "[main]\ncachedir={}\nreposdir={}\n",
            self.root.path().join("cache").display(),
            self.root.path().join("yum.repos.d").display(),
        ))
        .unwrap();
        config.set_local("network", if online { "1" } else { "0" }).unwrap();
        config.set_local("releasever", "12").unwrap();
        config.set_local("basearch", "i386").unwrap();
        Arc::new(config)
    }

    fn repository(&self, online: bool) -> RemoteRepository {
        RemoteRepository::open(
            &self.root.path().join("yum.repos.d/fedora.repo"),
            "fedora",
            self.config(online),
            self.fetcher.clone(),
        )
        .unwrap()
    }

    fn cache(&self) -> PathBuf {
        self.root.path().join("cache/fedora")
    }
}

fn ids(packages: &[Package]) -> Vec<String> {
    packages.iter().map(|p| p.package_id()).collect()
}

#[test]
fn test_queries_end_to_end() {
    let system = System::new(FEDORA_REPO);
    serve_repo(&system.fetcher, BASE_URL);
    let mut repo = system.repository(true);
    let cancel = Cancellable::new();

    let resolved = repo.resolve("PackageKit", &cancel).unwrap();
    assert_eq!(
        ids(&resolved),
        vec![
            "PackageKit;0.5.4-1.fc12;i386;fedora",
            "PackageKit;0.5.5-1.fc12;i386;fedora",
        ]
    );

    let found = repo.search_name("gnome", &cancel).unwrap();
    assert_eq!(ids(&found), vec!["gnome-packagekit;2.28.1-1.fc12;i386;fedora"]);

    // LIKE folds ASCII case
    assert_eq!(repo.search_name("packagekit", &cancel).unwrap().len(), 3);

    let details = repo.search_details("D-Bus", &cancel).unwrap();
    assert_eq!(details.len(), 2);

    let owners = repo.search_file("/usr/bin/gpk-update-viewer", &cancel).unwrap();
    assert_eq!(ids(&owners), vec!["gnome-packagekit;2.28.1-1.fc12;i386;fedora"]);

    let providers = repo.what_provides("PackageKit", &cancel).unwrap();
    assert_eq!(ids(&providers), vec!["PackageKit;0.5.5-1.fc12;i386;fedora"]);

    let package = repo
        .find_package("gnome-packagekit;2.28.1-1.fc12;i386;fedora", &cancel)
        .unwrap();
    assert_eq!(package.summary().unwrap().as_ref(), "Session applications to manage packages");
    assert_eq!(package.requires().unwrap()[0].to_string(), "PackageKit > 0.5.0");
    assert!(matches!(package.url(), Err(Error::NotFound(_))));
}

#[test]
fn test_updates_and_categories() {
    let system = System::new(FEDORA_REPO);
    serve_repo(&system.fetcher, BASE_URL);
    let mut repo = system.repository(true);
    let cancel = Cancellable::new();

    let installed = InstalledPackages::new(vec![Package::new(
        PackageIdentity::new("PackageKit", None, "0.5.4", "1.fc12", "i386", "installed"),
        true,
    )]);

    let updates = repo.get_updates(&installed, &cancel).unwrap();
    assert_eq!(ids(&updates), vec!["PackageKit;0.5.5-1.fc12;i386;fedora"]);

    let categories = repo.get_categories(&cancel).unwrap();
    assert_eq!(categories[0].id, "system");
    assert_eq!(categories[1].id, "admin-tools");
    assert_eq!(categories[1].parent_id.as_deref(), Some("system"));

    let members = repo.search_category("admin-tools", &installed, &cancel).unwrap();
    assert_eq!(
        ids(&members),
        vec![
            "PackageKit;0.5.4-1.fc12;i386;installed",
            "gnome-packagekit;2.28.1-1.fc12;i386;fedora",
        ]
    );
}

#[test]
fn test_mirror_rotation_reaches_last_mirror() {
    let system = System::new(
        "\
[fedora]
name=Fedora
mirrorlist=http://mirrors.example.org/mirrorlist?repo=fedora-$releasever&arch=$basearch
enabled=1
",
    );
    system.fetcher.serve(
        "http://mirrors.example.org/mirrorlist?repo=fedora-12&arch=i386",
        b"# repo = fedora-12 arch = i386\n\
          http://dead.example.org/fedora/12/i386/os/\n\
          http://gone.example.org/fedora/12/i386/os/\n\
          http://live.example.org/fedora/12/i386/os/\n",
    );
    serve_repo(&system.fetcher, "http://live.example.org/fedora/12/i386/os");

    let mut repo = system.repository(true);
    let packages = repo.get_packages(&Cancellable::new()).unwrap();
    assert_eq!(packages.len(), 3);

    let log = system.fetcher.log();
    let repomd_requests: Vec<&String> = log.iter().filter(|u| u.ends_with("repomd.xml")).collect();
    assert_eq!(repomd_requests.len(), 3);
    assert!(repomd_requests[0].starts_with("http://dead.example.org/"));
    assert!(repomd_requests[2].starts_with("http://live.example.org/"));
}

#[test]
fn test_corrupt_cache_recovers_online() {
    let system = System::new(FEDORA_REPO);
    serve_repo(&system.fetcher, BASE_URL);
    let cancel = Cancellable::new();

    system.repository(true).refresh(false, &cancel).unwrap();
    fs::write(system.cache().join("primary.sqlite"), b"garbage").unwrap();
    fs::write(system.cache().join("primary.sqlite.bz2"), b"garbage").unwrap();
    let before = system.fetcher.log().len();

    let mut repo = system.repository(true);
    assert_eq!(repo.resolve("PackageKit", &cancel).unwrap().len(), 2);

    let log = system.fetcher.log();
    assert_eq!(
        &log[before..],
        &[format!("{}/repodata/primary.sqlite.bz2", BASE_URL)]
    );
}

#[test]
fn test_offline_never_touches_network() {
    let system = System::new(FEDORA_REPO);
    serve_repo(&system.fetcher, BASE_URL);
    let cancel = Cancellable::new();

    system.repository(true).refresh(false, &cancel).unwrap();
    let before = system.fetcher.log().len();

    // A damaged uncompressed copy is rebuilt from the compressed one
    fs::write(system.cache().join("primary.sqlite"), b"garbage").unwrap();
    let mut repo = system.repository(false);
    assert_eq!(repo.resolve("PackageKit", &cancel).unwrap().len(), 2);

    // With both copies damaged there is nothing left to trust
    fs::write(system.cache().join("primary.sqlite"), b"garbage").unwrap();
    fs::write(system.cache().join("primary.sqlite.bz2"), b"garbage").unwrap();
    let mut repo = system.repository(false);
    assert!(matches!(
        repo.resolve("PackageKit", &cancel),
        Err(Error::OfflineAndStale(_))
    ));

    assert_eq!(system.fetcher.log().len(), before);
}

#[test]
fn test_refresh_and_clean() {
    let system = System::new(FEDORA_REPO);
    serve_repo(&system.fetcher, BASE_URL);
    let cancel = Cancellable::new();
    let mut repo = system.repository(true);

    repo.refresh(false, &cancel).unwrap();
    for file in ["repomd.xml", "primary.sqlite", "filelists.sqlite", "comps.xml"] {
        assert!(system.cache().join(file).exists(), "{} should be cached", file);
    }

    // Everything is current, so only repomd.xml is fetched again
    let before = system.fetcher.log().len();
    repo.refresh(false, &cancel).unwrap();
    assert_eq!(system.fetcher.log().len(), before + 1);

    repo.clean(&cancel).unwrap();
    for file in ["repomd.xml", "primary.sqlite", "primary.sqlite.bz2", "comps.xml"] {
        assert!(!system.cache().join(file).exists(), "{} should be removed", file);
    }
}

#[test]
fn test_repository_set_enable_disable() {
    let system = System::new(FEDORA_REPO);
    let mut set = RepositorySet::load(system.config(true), system.fetcher.clone()).unwrap();
    assert_eq!(set.get_stores_enabled().len(), 1);

    set.get_store("fedora").unwrap().set_enabled(false).unwrap();
    assert!(set.get_stores_enabled().is_empty());

    let written = fs::read_to_string(system.root.path().join("yum.repos.d/fedora.repo")).unwrap();
    assert!(written.contains("enabled=0"));

    let mut reloaded = RepositorySet::load(system.config(true), system.fetcher.clone()).unwrap();
    assert!(!reloaded.get_store("fedora").unwrap().is_enabled());
}

#[test]
fn test_compare_evr() {
    use std::cmp::Ordering;

    assert_eq!(compare_evr("0.5.4-1.fc12", "0.5.5-1.fc12"), Ordering::Less);
    assert_eq!(compare_evr("1:0.1-1", "0.9-1"), Ordering::Greater);
    assert_eq!(compare_evr("0:2.28.1", "2.28.1"), Ordering::Equal);
}
