use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const HARDWARE_KEYS: [(&str, u64); 9] = [
    ("block_size", 16),
    ("small_channel_width", 4),
    ("element_bytes", 2),
    ("accumulator_element_bytes", 4),
    ("staging_bytes", 512 * 1024),
    ("near_compute_a_bytes", 64 * 1024),
    ("near_compute_b_bytes", 64 * 1024),
    ("accumulator_bytes", 128 * 1024),
    ("vector_scratch_bytes", 192 * 1024),
];

fn main() {
    if let Err(err) = apply_settings() {
        eprintln!("build.rs: failed to apply settings: {err}");
        if let Err(write_err) = write_rust_config(&defaults()) {
            eprintln!("build.rs: failed to write default hardware config: {write_err}");
        }
    }
}

fn defaults() -> Vec<(String, u64)> {
    HARDWARE_KEYS
        .iter()
        .map(|(key, value)| (key.to_string(), *value))
        .collect()
}

fn apply_settings() -> Result<(), Box<dyn std::error::Error>> {
    let manifest_dir = PathBuf::from(env::var("CARGO_MANIFEST_DIR")?);
    let settings_path = manifest_dir.join("../settings.json");
    println!("cargo:rerun-if-changed={}", settings_path.display());
    let values = read_hardware_settings(&settings_path);
    let block = values
        .iter()
        .find(|(key, _)| key == "block_size")
        .map(|(_, value)| *value)
        .unwrap_or(16);
    println!("cargo:rustc-env=CONVTILE_BLOCK_SIZE={}", block);
    write_rust_config(&values)?;
    Ok(())
}

fn read_hardware_settings(path: &Path) -> Vec<(String, u64)> {
    let hardware = fs::read_to_string(path)
        .ok()
        .and_then(|contents| serde_json::from_str::<serde_json::Value>(&contents).ok())
        .and_then(|value| value.get("convtile")?.get("hardware").cloned());
    HARDWARE_KEYS
        .iter()
        .map(|(key, fallback)| {
            let value = hardware
                .as_ref()
                .and_then(|v| v.get(*key))
                .and_then(|v| v.as_u64())
                .filter(|v| *v > 0)
                .unwrap_or(*fallback);
            (key.to_string(), value)
        })
        .collect()
}

fn write_rust_config(values: &[(String, u64)]) -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let out_file = out_dir.join("hw_config.rs");
    let mut output = String::new();
    for (key, value) in values {
        output.push_str(&format!(
            "pub const {}: u64 = {};\n",
            key.to_ascii_uppercase(),
            value
        ));
    }
    fs::write(out_file, output)?;
    Ok(())
}
