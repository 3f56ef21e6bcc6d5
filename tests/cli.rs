use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// Writes a one-triangle binary glTF named `product1.glb` into a temp dir.
fn write_model() -> (TempDir, PathBuf) {
    let mut bin = Vec::new();
    for value in [0.0f32, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0] {
        bin.extend_from_slice(&value.to_le_bytes());
    }
    for index in [0u32, 1, 2] {
        bin.extend_from_slice(&index.to_le_bytes());
    }
    let json = format!(
        r#"{{"asset":{{"version":"2.0"}},"scene":0,"scenes":[{{"nodes":[0]}}],"nodes":[{{"mesh":0}}],"meshes":[{{"primitives":[{{"attributes":{{"POSITION":0}},"indices":1}}]}}],"buffers":[{{"byteLength":{len}}}],"bufferViews":[{{"buffer":0,"byteOffset":0,"byteLength":36}},{{"buffer":0,"byteOffset":36,"byteLength":12}}],"accessors":[{{"bufferView":0,"componentType":5126,"count":3,"type":"VEC3","min":[0,0,0],"max":[1,1,0]}},{{"bufferView":1,"componentType":5125,"count":3,"type":"SCALAR"}}]}}"#,
        len = bin.len()
    );
    let mut json = json.into_bytes();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut glb = Vec::with_capacity(total);
    glb.extend_from_slice(b"glTF");
    glb.extend_from_slice(&2u32.to_le_bytes());
    glb.extend_from_slice(&(total as u32).to_le_bytes());
    glb.extend_from_slice(&(json.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"JSON");
    glb.extend_from_slice(&json);
    glb.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    glb.extend_from_slice(b"BIN\0");
    glb.extend_from_slice(&bin);

    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("product1.glb");
    fs::write(&path, glb).expect("write model");
    (dir, path)
}

#[test]
fn headless_session_prints_summary() {
    let (_dir, model) = write_model();
    let mut cmd = Command::cargo_bin("ar-viewer").expect("binary exists");
    cmd.arg(&model).arg("--headless").arg("--frames").arg("10");
    cmd.assert()
        .success()
        .stdout(contains("Start control hidden"))
        .stdout(contains("Start control visible"))
        .stdout(contains(
            "Loaded model product1.glb (1 primitives, 1 triangles)",
        ))
        .stdout(contains("Session ended after 10 frames (10 with pose)"))
        .stdout(contains("Model removed from scene"));
}

#[test]
fn unsupported_device_only_alerts() {
    let (_dir, model) = write_model();
    let mut cmd = Command::cargo_bin("ar-viewer").expect("binary exists");
    cmd.arg(&model).arg("--headless").arg("--unsupported");
    cmd.assert()
        .success()
        .stdout(contains("Alert: WebXR AR not supported on this device."))
        .stdout(contains("Start control").not())
        .stdout(contains("Session ended").not());
}

#[test]
fn missing_model_fails_after_restoring_control() {
    let dir = TempDir::new().expect("temp dir");
    let mut cmd = Command::cargo_bin("ar-viewer").expect("binary exists");
    cmd.arg(dir.path().join("product1.glb")).arg("--headless");
    cmd.assert()
        .failure()
        .stdout(contains("Start control hidden"))
        .stdout(contains("Start control visible"))
        .stderr(contains("AR session failed to start"));
}

#[test]
fn unknown_flag_is_rejected() {
    let (_dir, model) = write_model();
    let mut cmd = Command::cargo_bin("ar-viewer").expect("binary exists");
    cmd.arg(&model).arg("--bogus");
    cmd.assert()
        .failure()
        .stderr(contains("Unknown argument: --bogus"));
}
