use assert_cmd::Command;
use std::error::Error;
use std::ffi::OsStr;
use tempfile::tempdir;

fn run_stdout<I, S>(args: I) -> Result<String, Box<dyn Error>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::cargo_bin("dynapsim")?;
    cmd.args(args);
    let output = cmd.assert().success().get_output().stdout.clone();
    Ok(String::from_utf8(output)?)
}

const CONFIG: &str = r#"
[core]
idc = 1e-5

[simulation]
steps = 100

[network]
n_neurons = 2

[[network.base_weights]]
source_core = 0
dest_core = 0
weights = [1e-7, 2e-7, 4e-7, 8e-7]

[[network.connections]]
pre = 0
post = 1
synapse = "ampa"
mask = 15
"#;

#[test]
fn bias_get_prints_current() -> Result<(), Box<dyn Error>> {
    let stdout = run_stdout(["bias", "get", "7", "255"])?;
    assert!(stdout.contains("2.4e-5 A"), "stdout: {}", stdout);
    Ok(())
}

#[test]
fn bias_get_rejects_invalid_coarse() -> Result<(), Box<dyn Error>> {
    Command::cargo_bin("dynapsim")?
        .args(["bias", "get", "8", "0"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn bias_find_exact_and_approximate() -> Result<(), Box<dyn Error>> {
    let exact = run_stdout(["bias", "find", "1.5e-11"])?;
    assert!(exact.starts_with("(0, 255)"), "stdout: {}", exact);

    let approx = run_stdout(["bias", "find", "1.5e-11", "--largest-coarse", "--approximate"])?;
    assert!(approx.starts_with("(2, 5)"), "stdout: {}", approx);

    Command::cargo_bin("dynapsim")?
        .args(["bias", "find", "1e-3"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn bias_table_limit() -> Result<(), Box<dyn Error>> {
    let stdout = run_stdout(["bias", "table", "--limit", "3"])?;
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("0\t0\t"));
    Ok(())
}

#[test]
fn simulate_writes_json_report() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let config = tmp.path().join("net.toml");
    std::fs::write(&config, CONFIG)?;
    let out = tmp.path().join("spikes.json");

    Command::cargo_bin("dynapsim")?
        .args(["simulate", "--config"])
        .arg(&config)
        .args(["--steps", "50", "--record", "--output"])
        .arg(&out)
        .assert()
        .success();

    let report: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out)?)?;
    assert_eq!(report["steps"], 50);
    assert_eq!(report["n_neurons"], 2);
    let counts = report["spike_counts"].as_array().ok_or("spike_counts")?;
    assert_eq!(counts.len(), 2);
    assert!(counts[0].as_f64().ok_or("count")? > 0.0);
    assert_eq!(report["traces"]["imem"].as_array().ok_or("imem")?.len(), 50);
    Ok(())
}

#[test]
fn simulate_without_output_prints_total() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    let config = tmp.path().join("net.toml");
    std::fs::write(&config, CONFIG)?;

    let stdout = run_stdout([
        OsStr::new("simulate"),
        OsStr::new("--config"),
        config.as_os_str(),
    ])?;
    assert!(stdout.starts_with("total spikes:"), "stdout: {}", stdout);
    Ok(())
}

#[test]
fn simulate_missing_config_fails() -> Result<(), Box<dyn Error>> {
    let tmp = tempdir()?;
    Command::cargo_bin("dynapsim")?
        .args(["simulate", "--config"])
        .arg(tmp.path().join("absent.toml"))
        .assert()
        .failure();
    Ok(())
}
