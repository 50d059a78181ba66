use std::fs::write;
use std::path::PathBuf;

use tempfile::{tempdir, NamedTempFile};

use b2_sync::load_config::{load_config, write_default};

#[test]
fn full_yaml_overrides_every_section() {
    let config_yaml = r#"
b2:
  bucket_name: holiday-photos
  sync_timeout_secs: 60
  max_file_size_gb: 1
onepassword:
  item_name: "B2 Key Holiday"
processing:
  exclude_patterns:
    - ".*\\.tmp"
paths:
  input_dir: ./photos
  output_dir: ./runs
  b2_bin: /usr/local/bin/b2
  op_bin: /usr/local/bin/op
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();

    let config = load_config(config_file.path()).expect("config should load");
    assert_eq!(config.b2.bucket_name, "holiday-photos");
    assert_eq!(config.b2.sync_timeout_secs, 60);
    assert_eq!(config.onepassword.item_name, "B2 Key Holiday");
    assert_eq!(config.processing.exclude_patterns, vec![r".*\.tmp"]);
    assert_eq!(config.paths.input_dir, PathBuf::from("./photos"));
    assert_eq!(config.paths.b2_bin, "/usr/local/bin/b2");
}

#[test]
fn partial_yaml_falls_back_to_defaults() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "b2:\n  bucket_name: photos\n").unwrap();

    let config = load_config(config_file.path()).expect("config should load");
    assert_eq!(config.b2.bucket_name, "photos");
    assert_eq!(config.b2.sync_timeout_secs, 1800);
    assert_eq!(config.paths.op_bin, "op");
}

#[test]
fn missing_file_yields_defaults() {
    let dir = tempdir().unwrap();
    let config = load_config(dir.path().join("does_not_exist.yml")).expect("defaults");
    assert_eq!(config.b2.bucket_name, "fal-bucket");
}

#[test]
fn unparseable_yaml_is_a_hard_error() {
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), "b2: [not: a: mapping\n").unwrap();
    assert!(load_config(config_file.path()).is_err());
}

#[test]
fn write_default_round_trips_through_load() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("b2_sync_config.yml");

    write_default(&path).expect("write default config");
    assert!(path.exists());

    let config = load_config(&path).expect("config should load");
    assert_eq!(config.b2.bucket_name, "fal-bucket");
    assert_eq!(config.processing.exclude_patterns.len(), 2);
}
