use serde_json::Value;
use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(prefix: &str) -> Self {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock should be after unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "geograph-cli-{prefix}-{}-{unique}",
            std::process::id()
        ));
        fs::create_dir_all(&path).expect("temp dir should be created");
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.path);
    }
}

fn run_geograph<I, S>(dir: &Path, args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = env!("CARGO_BIN_EXE_geograph");
    Command::new(bin)
        .current_dir(dir)
        .env_remove("GEOGRAPH_TOLERANT")
        .args(args)
        .output()
        .expect("geograph command should execute")
}

fn assert_success(output: &Output) {
    if !output.status.success() {
        panic!(
            "command failed with status {:?}\nstdout:\n{}\nstderr:\n{}",
            output.status.code(),
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn assert_failure(output: &Output) {
    if output.status.success() {
        panic!(
            "command unexpectedly succeeded\nstdout:\n{}\nstderr:\n{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr),
        );
    }
}

fn stdout_text(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn parse_json_stdout(output: &Output) -> Value {
    serde_json::from_slice::<Value>(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "expected valid JSON stdout, got error: {e}\nstdout:\n{}",
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

/// Writes `data/clusters.json` and `data/adjacency.json` (the default paths).
fn write_sample_sources(root: &Path) {
    let data = root.join("data");
    fs::create_dir_all(&data).expect("data dir should be created");
    fs::write(
        data.join("clusters.json"),
        r#"{
  "Cluster A": [
    {"name": "P", "lat": 0.0, "lng": 0.0},
    {"name": "Q", "lat": 0.0, "lng": 1.0}
  ],
  "Cluster B": [
    {"name": "R", "lat": 0.0, "lng": 10.0}
  ]
}"#,
    )
    .expect("clusters should be written");
    fs::write(
        data.join("adjacency.json"),
        r#"{"p": ["q", "r"], "q": ["p"]}"#,
    )
    .expect("adjacency should be written");
}

#[test]
fn doctor_json_reports_accepted_catalog() {
    let tmp = TempDirGuard::new("doctor-ok");
    write_sample_sources(tmp.path());

    let output = run_geograph(tmp.path(), ["doctor", "--json"]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["schema"], 1);
    assert_eq!(payload["reportKind"], "geograph.doctor.report.v1");
    assert_eq!(payload["result"], "accepted");
    assert_eq!(payload["counts"]["suburbs"], 3);
    assert_eq!(payload["edgeStats"]["crossClusterEdges"], 1);
    assert!(
        tmp.path()
            .join(".geograph/reports/doctor-report.txt")
            .exists()
    );
}

#[test]
fn doctor_rejects_unknown_coverage_suburb_unless_tolerant() {
    let tmp = TempDirGuard::new("doctor-atlantis");
    write_sample_sources(tmp.path());
    fs::write(
        tmp.path().join("coverage.json"),
        r#"{"plumbing": ["p", "atlantis"]}"#,
    )
    .expect("coverage should be written");

    let output = run_geograph(tmp.path(), ["doctor", "--coverage", "coverage.json"]);
    assert_failure(&output);
    let text = stdout_text(&output);
    assert!(text.starts_with("[doctor] FAIL"));
    assert!(text.contains("atlantis"));
    let report = fs::read_to_string(tmp.path().join(".geograph/reports/doctor-report.txt"))
        .expect("report should be written on failure");
    assert!(report.contains("referential.coverage.unknown_suburb"));

    let tolerant = Command::new(env!("CARGO_BIN_EXE_geograph"))
        .current_dir(tmp.path())
        .env("GEOGRAPH_TOLERANT", "true")
        .args(["doctor", "--coverage", "coverage.json"])
        .output()
        .expect("geograph command should execute");
    assert_success(&tolerant);
    assert!(stdout_text(&tolerant).contains("WARN atlantis"));
}

#[test]
fn nearby_ranks_adjacent_same_cluster_first() {
    let tmp = TempDirGuard::new("nearby");
    write_sample_sources(tmp.path());

    let output = run_geograph(tmp.path(), ["nearby", "P", "--limit", "1", "--json"]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["suburb"], "p");
    assert_eq!(payload["nearby"][0]["slug"], "q");
    assert_eq!(payload["nearby"].as_array().map(Vec::len), Some(1));

    let output = run_geograph(tmp.path(), ["nearby", "--out", "nearby.json", "--json"]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    let etag = payload["etag"].as_str().expect("etag");
    assert!(etag.starts_with("nb1_"));
    let written: Value = serde_json::from_str(
        &fs::read_to_string(tmp.path().join("nearby.json")).expect("snapshot written"),
    )
    .expect("snapshot json");
    assert_eq!(written["etag"], etag);

    let output = run_geograph(tmp.path(), ["nearby", "atlantis"]);
    assert_failure(&output);
}

#[test]
fn enforce_cross_cluster_rewrites_adjacency() {
    let tmp = TempDirGuard::new("enforce");
    write_sample_sources(tmp.path());

    let dry = run_geograph(tmp.path(), ["enforce-cross-cluster", "--dry-run", "--json"]);
    assert_success(&dry);
    let payload = parse_json_stdout(&dry);
    assert_eq!(payload["removed"], 1);
    assert_eq!(payload["rewritten"], false);

    let allow = run_geograph(tmp.path(), ["enforce-cross-cluster", "--mode", "allow", "--json"]);
    assert_success(&allow);
    assert_eq!(parse_json_stdout(&allow)["removed"], 0);

    let output = run_geograph(tmp.path(), ["enforce-cross-cluster"]);
    assert_success(&output);
    assert!(stdout_text(&output).contains("removed p->r"));
    let adjacency: Value = serde_json::from_str(
        &fs::read_to_string(tmp.path().join("data/adjacency.json")).expect("adjacency"),
    )
    .expect("adjacency json");
    assert_eq!(adjacency["p"], serde_json::json!(["q"]));
}

#[test]
fn split_writes_sub_clusters() {
    let tmp = TempDirGuard::new("split");
    write_sample_sources(tmp.path());

    let output = run_geograph(
        tmp.path(),
        ["split", "cluster-a", "--label", "left", "--label", "right", "--write", "--json"],
    );
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["split"]["clusters"][0]["slug"], "cluster-a-left");

    let clusters: Value = serde_json::from_str(
        &fs::read_to_string(tmp.path().join("data/clusters.json")).expect("clusters"),
    )
    .expect("clusters json");
    let slugs: Vec<&str> = clusters["clusters"]
        .as_array()
        .expect("clusters array")
        .iter()
        .filter_map(|c| c["slug"].as_str())
        .collect();
    assert_eq!(slugs, vec!["cluster-a-left", "cluster-a-right", "cluster-b"]);

    let output = run_geograph(tmp.path(), ["split", "cluster-b", "--k", "2"]);
    assert_failure(&output);
}

#[test]
fn split_write_keeps_enriched_coordinates_out_of_the_source() {
    let tmp = TempDirGuard::new("split-enriched");
    write_sample_sources(tmp.path());
    fs::write(
        tmp.path().join("data/clusters.json"),
        r#"{
  "Cluster A": [
    {"name": "P", "lat": 0.0, "lng": 0.0},
    {"name": "Q", "lat": 0.0, "lng": 1.0},
    "S"
  ],
  "Cluster B": [
    {"name": "R", "lat": 0.0, "lng": 10.0}
  ]
}"#,
    )
    .expect("clusters should be written");
    fs::write(tmp.path().join("coords.csv"), "slug,name,lat,lng\ns,S,0.0,0.9\n")
        .expect("coords should be written");

    let output = run_geograph(
        tmp.path(),
        ["split", "cluster-a", "--enrich-csv", "coords.csv", "--write", "--json"],
    );
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["split"]["unplaced"], serde_json::json!([]));

    let clusters: Value = serde_json::from_str(
        &fs::read_to_string(tmp.path().join("data/clusters.json")).expect("clusters"),
    )
    .expect("clusters json");
    let suburbs: Vec<&Value> = clusters["clusters"]
        .as_array()
        .expect("clusters array")
        .iter()
        .flat_map(|c| c["suburbs"].as_array().into_iter().flatten())
        .collect();
    let s = suburbs
        .iter()
        .find(|s| s["slug"] == "s")
        .expect("s should still be in a cluster");
    assert!(s.get("lat").is_none());
    assert!(s.get("lng").is_none());
    assert_eq!(suburbs.len(), 4);
}

#[test]
fn split_rejects_taken_slugs_and_repeated_labels() {
    let tmp = TempDirGuard::new("split-clash");
    write_sample_sources(tmp.path());
    let authored = r#"{
  "Cluster A": [
    {"name": "P", "lat": 0.0, "lng": 0.0},
    {"name": "Q", "lat": 0.0, "lng": 1.0}
  ],
  "Cluster A Left": [
    {"name": "R", "lat": 0.0, "lng": 10.0}
  ]
}"#;
    fs::write(tmp.path().join("data/clusters.json"), authored)
        .expect("clusters should be written");

    let output = run_geograph(
        tmp.path(),
        ["split", "cluster-a", "--label", "left", "--label", "right", "--write"],
    );
    assert_failure(&output);
    assert!(String::from_utf8_lossy(&output.stderr).contains("cluster-a-left"));
    assert_eq!(
        fs::read_to_string(tmp.path().join("data/clusters.json")).expect("clusters"),
        authored
    );

    let output = run_geograph(
        tmp.path(),
        ["split", "cluster-a", "--label", "east", "--label", "East"],
    );
    assert_failure(&output);
}

#[test]
fn limit_must_be_positive() {
    let tmp = TempDirGuard::new("limit-zero");
    write_sample_sources(tmp.path());

    assert_failure(&run_geograph(tmp.path(), ["nearby", "P", "--limit", "0"]));
    assert_failure(&run_geograph(tmp.path(), ["doctor", "--limit", "0"]));
    assert_success(&run_geograph(tmp.path(), ["nearby", "P", "--limit", "1"]));
}

#[test]
fn normalize_writes_canonical_documents_and_lists_violations() {
    let tmp = TempDirGuard::new("normalize");
    write_sample_sources(tmp.path());

    let output = run_geograph(tmp.path(), ["normalize", "--json"]);
    assert_success(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["clusters"], 2);
    let clusters: Value = serde_json::from_str(
        &fs::read_to_string(tmp.path().join(".geograph/normalized/clusters.json"))
            .expect("normalized clusters"),
    )
    .expect("normalized json");
    assert_eq!(clusters["clusters"][0]["slug"], "cluster-a");
    assert_eq!(clusters["clusters"][0]["suburbs"][0]["slug"], "p");

    fs::write(
        tmp.path().join("bad.json"),
        r#"{"clusters": [{"suburbs": ["x"]}, {"slug": "y", "suburbs": [{"slug": "z", "lat": 95}]}]}"#,
    )
    .expect("bad clusters should be written");
    let output = run_geograph(tmp.path(), ["normalize", "--clusters", "bad.json", "--json"]);
    assert_failure(&output);
    let payload = parse_json_stdout(&output);
    assert_eq!(payload["result"], "rejected");
    assert!(payload["violations"].as_array().map(Vec::len).unwrap_or(0) >= 2);
}
