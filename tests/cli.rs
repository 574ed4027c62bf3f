use assert_cmd::Command;
use std::fs;
use tempfile::TempDir;

fn fake_cgroup(root: &TempDir, name: &str) -> std::path::PathBuf {
    let dir = root.path().join(name);
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("memory.current"), "5678\n").unwrap();
    fs::write(dir.join("memory.high"), "max\n").unwrap();
    fs::write(dir.join("memory.swap.current"), "0\n").unwrap();
    fs::write(
        dir.join("memory.pressure"),
        "some avg10=1.23 avg60=4.56 avg300=7.89 total=1234\nfull avg10=5.67 avg60=8.90 avg300=0.12 total=5678\n",
    )
    .unwrap();
    dir
}

fn exporter() -> Command {
    let mut cmd = Command::cargo_bin("cgroupv2-exporter").unwrap();
    cmd.env_remove("RUST_LOG")
        .env_remove("CGROUPV2_EXPORTER_CGROUPS")
        .env_remove("CGROUPV2_EXPORTER_COLLECT");
    cmd
}

#[test]
fn test_once_prints_exposition() {
    let root = TempDir::new().unwrap();
    let dir = fake_cgroup(&root, "web.service");

    let output = exporter()
        .arg("--once")
        .arg("--cgroup")
        .arg(&dir)
        .output()
        .unwrap();
    assert!(output.status.success());

    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.contains("cgroupv2_memory_current{cgroup=\"web_service\"} 5678"));
    assert!(text.contains("cgroupv2_memory_high{cgroup=\"web_service\"} +Inf"));
    assert!(text.contains("cgroupv2_memory_pressure_full_avg60{cgroup=\"web_service\"} 8.9"));
    assert!(text.contains("cgroupv2_scrape_collector_success{collector=\"memory.pressure\"} 1"));
    assert!(!text.contains("memory_stat"));
}

#[test]
fn test_failed_collector_reports_zero_success() {
    let root = TempDir::new().unwrap();
    let dir = fake_cgroup(&root, "db.service");

    let output = exporter()
        .args(["--once", "--collector.memory.stat", "--collect", "memory.stat,memory.current"])
        .arg("--cgroup")
        .arg(&dir)
        .output()
        .unwrap();
    assert!(output.status.success());

    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.contains("cgroupv2_scrape_collector_success{collector=\"memory.stat\"} 0"));
    assert!(text.contains("cgroupv2_scrape_collector_success{collector=\"memory.current\"} 1"));
    assert!(!text.contains("collector=\"memory.high\""));
}

#[test]
fn test_filter_on_disabled_collector_fails() {
    exporter()
        .args(["--once", "--collect", "memory.stat"])
        .assert()
        .failure();
}

#[test]
fn test_output_file() {
    let root = TempDir::new().unwrap();
    let dir = fake_cgroup(&root, "batch.slice");
    let out = root.path().join("cgroupv2.prom");
    let sibling = root.path().join("cgroupv2.tmp");
    fs::write(&sibling, "unrelated\n").unwrap();

    exporter()
        .arg("--once")
        .arg("--cgroup")
        .arg(&dir)
        .arg("--output")
        .arg(&out)
        .assert()
        .success();

    let text = fs::read_to_string(&out).unwrap();
    assert!(text.contains("cgroupv2_memory_swap_current{cgroup=\"batch_slice\"} 0"));
    assert_eq!(fs::read_to_string(&sibling).unwrap(), "unrelated\n");
}

#[test]
fn test_list_collectors() {
    let output = exporter()
        .args(["--collector.list", "--no-collector.memory.high"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.contains("memory.current\tenabled"));
    assert!(text.contains("memory.high\tdisabled"));
    assert!(text.contains("memory.stat\tdisabled"));
}
