use std::io::Write;

use super::*;

const SETTINGS: &str = r#"
        fast_mode = true
        verbose = true

        [priorities]
        "alpha" = 10
        "beta" = -3
    "#;

#[test]
fn test_parse_full_document() {
	let settings = Settings::from_toml(SETTINGS).unwrap();
	assert!(settings.fast_mode);
	assert!(settings.verbose);
	assert!(!settings.lock_definitions);
	assert_eq!(settings.priority("alpha"), Some(10));
	assert_eq!(settings.priority("beta"), Some(-3));
	assert_eq!(settings.priority("gamma"), None);
}

#[test]
fn test_empty_document_is_default() {
	assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
}

#[test]
fn test_unknown_fields_rejected() {
	let err = Settings::from_toml("fastmode = true").unwrap_err();
	assert!(matches!(err, ConfigError::Toml(_)));
}

#[test]
fn test_empty_package_id_rejected() {
	let err = Settings::from_toml("[priorities]\n\"\" = 1").unwrap_err();
	assert!(matches!(err, ConfigError::EmptyPackageId));
}

#[test]
fn test_load_from_file() {
	let mut file = tempfile::NamedTempFile::new().unwrap();
	file.write_all(b"lock_definitions = true\n").unwrap();
	let settings = Settings::load(file.path()).unwrap();
	assert!(settings.lock_definitions);

	let missing = Settings::load(std::path::Path::new("/definitely/not/here.toml"));
	assert!(matches!(missing, Err(ConfigError::Io { .. })));
}

#[test]
fn test_with_priority_builder() {
	let settings = Settings::default().with_priority("alpha", 4);
	assert_eq!(settings.priority("alpha"), Some(4));
}
