//! Integration tests for cellxgene-config

use cellxgene_config::domains::dataset::XApproximateDistribution;
use cellxgene_config::*;
use proptest::prelude::*;
use serde_yaml::Value;
use std::path::Path;
use temp_env::with_vars;

const MULTI_DATASET: &str = r#"
server:
  multi_dataset:
    dataroot:
      d1: /data/d1
      d2: /data/d2
"#;

fn packaged_app() -> AppConfig {
    AppConfig::with_default_config(DefaultConfig::packaged().unwrap()).unwrap()
}

fn write_default_config(dir: &Path, edit: impl FnOnce(&mut Value)) {
    let mut root: Value =
        serde_yaml::from_str(include_str!("../default_config.yml")).unwrap();
    edit(&mut root);
    std::fs::write(
        dir.join("default_config.yml"),
        serde_yaml::to_string(&root).unwrap(),
    )
    .unwrap();
}

#[test]
fn test_default_config_from_project_root() {
    let dir = tempfile::tempdir().unwrap();
    write_default_config(dir.path(), |root| {
        root["server"]["single_dataset"]["datapath"] = Value::from("/data/a.h5ad");
        root["dataset"]["presentation"]["max_categories"] = Value::from(42);
    });

    with_vars(vec![("PROJECT_ROOT", Some(dir.path().as_os_str()))], || {
        let mut config = AppConfig::new().unwrap();
        assert!(config.changes_from_default().unwrap().is_empty());

        let completed = config.complete_config().unwrap();
        let dataset = completed.get_dataset_config("anything");
        assert_eq!(dataset.settings().presentation.max_categories, 42);
        assert!(std::ptr::eq(dataset, completed.default_dataset_config()));
    });
}

#[test]
fn test_invalid_default_config_fails_completion() {
    let dir = tempfile::tempdir().unwrap();
    write_default_config(dir.path(), |root| {
        root["server"]["single_dataset"]["datapath"] = Value::from("/data/a.h5ad");
        root["server"]["limits"]["column_request_max"] = Value::from(0);
    });

    with_vars(vec![("PROJECT_ROOT", Some(dir.path().as_os_str()))], || {
        let mut config = AppConfig::new().unwrap();
        assert!(config.complete_config().is_err());
        assert!(matches!(config.check_config(), Err(ConfigError::NotCompleted)));
    });
}

#[test]
fn test_missing_project_root_default_config() {
    let dir = tempfile::tempdir().unwrap();
    with_vars(vec![("PROJECT_ROOT", Some(dir.path().as_os_str()))], || {
        assert!(matches!(AppConfig::new(), Err(ConfigError::FileReadError(_))));
    });
}

#[test]
fn test_config_loader_from_env() {
    let vars = vec![
        ("PROJECT_ROOT", None),
        ("CXG_SERVER__APP__PORT", Some("5006")),
        ("CXG_SERVER__SINGLE_DATASET__DATAPATH", Some("/data/a.h5ad")),
        ("CXG_DATASET__X_APPROXIMATE_DISTRIBUTION", Some("count")),
        ("CXG_DATASET__DIFFEXP__TOP_N", Some("25")),
    ];

    with_vars(vars, || {
        let loader = ConfigLoader::new();
        let mut config = loader.load(None).unwrap();
        let completed = config.complete_config().unwrap();

        assert_eq!(completed.server_config().settings().app.port, Some(5006));
        let dataset = completed.default_dataset_config().settings();
        assert_eq!(dataset.x_approximate_distribution, XApproximateDistribution::Count);
        assert_eq!(dataset.diffexp.top_n, 25);
    });
}

#[test]
fn test_config_loader_keeps_string_options_as_text() {
    let vars = vec![
        ("PROJECT_ROOT", None),
        ("CXG_SERVER__SINGLE_DATASET__DATAPATH", Some("/data/a.h5ad")),
        ("CXG_SERVER__SINGLE_DATASET__TITLE", Some("2024")),
        ("CXG_SERVER__APP__SECRET_KEY", Some("12345")),
        ("CXG_SERVER__DATA_LOCATOR__S3__REGION_NAME", Some("true")),
        ("CXG_SERVER__APP__PORT", Some("5006")),
    ];

    with_vars(vars, || {
        let mut config = ConfigLoader::new().load(None).unwrap();
        let completed = config.complete_config().unwrap();

        let settings = completed.server_config().settings();
        assert_eq!(settings.single_dataset.title.as_deref(), Some("2024"));
        assert_eq!(settings.app.secret_key.as_deref(), Some("12345"));
        assert_eq!(settings.data_locator.s3.region_name, "true");
        assert_eq!(settings.app.port, Some(5006));
    });
}

#[test]
fn test_config_loader_rejects_unknown_env_option() {
    let vars = vec![("PROJECT_ROOT", None), ("CXG_SERVER__APP__PROT", Some("5006"))];

    with_vars(vars, || {
        let err = ConfigLoader::new().load(None).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownOption { .. }));
    });
}

#[test]
fn test_config_loader_file_then_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(
        &path,
        "server:\n  app:\n    port: 7000\n  single_dataset:\n    datapath: /data/a.h5ad\n",
    )
    .unwrap();

    let vars = vec![("PROJECT_ROOT", None), ("CXG_SERVER__APP__PORT", Some("7001"))];
    with_vars(vars, || {
        let mut config = ConfigLoader::new().load(Some(&path)).unwrap();
        let completed = config.complete_config().unwrap();
        assert_eq!(completed.server_config().derived().unwrap().port, 7001);
    });
}

#[test]
fn test_write_and_read_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("written.yaml");

    let mut config = packaged_app();
    config
        .update_server_config(
            &ConfigOptions::new()
                .with("app__port", 5010)
                .with("single_dataset__datapath", "/data/a.h5ad")
                .with("authentication__type", "none"),
        )
        .unwrap();
    config
        .update_default_dataset_config(
            &ConfigOptions::new()
                .with("user_annotations__enable", false)
                .with("embeddings__names", vec![Value::from("umap"), Value::from("tsne")]),
        )
        .unwrap();
    config.write_config(&path).unwrap();

    let mut reread = packaged_app();
    reread.update_from_config_file(&path).unwrap();
    assert_eq!(reread.to_value().unwrap(), config.to_value().unwrap());
    assert_eq!(
        reread.changes_from_default().unwrap(),
        config.changes_from_default().unwrap()
    );
}

#[test]
fn test_round_trip_with_dataroot_configs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("written.yaml");

    let mut config = packaged_app();
    config.update_from_yaml_str(MULTI_DATASET).unwrap();
    config
        .add_dataroot_config("d2", &ConfigOptions::new().with("diffexp__top_n", 5))
        .unwrap();
    config.write_config(&path).unwrap();

    let mut reread = packaged_app();
    reread.update_from_config_file(&path).unwrap();
    assert_eq!(reread.to_value().unwrap(), config.to_value().unwrap());

    let completed = reread.complete_config().unwrap();
    assert_eq!(completed.get_dataset_config("d2").settings().diffexp.top_n, 5);
}

#[test]
fn test_changes_are_exactly_the_updated_keys() {
    let mut config = packaged_app();
    config
        .update_server_config(
            &ConfigOptions::new()
                .with("app__verbose", true)
                // same as the default
                .with("app__host", "localhost"),
        )
        .unwrap();
    config
        .update_default_dataset_config(&ConfigOptions::new().with("presentation__custom_colors", false))
        .unwrap();

    let changes = config.changes_from_default().unwrap();
    assert_eq!(changes.server.keys().collect::<Vec<_>>(), ["app__verbose"]);
    assert_eq!(
        changes.dataset.keys().collect::<Vec<_>>(),
        ["presentation__custom_colors"]
    );
}

#[test]
fn test_cascade_reaches_every_dataroot() {
    let mut config = packaged_app();
    config.update_from_yaml_str(MULTI_DATASET).unwrap();
    config.add_dataroot_config("d1", &ConfigOptions::new()).unwrap();
    config
        .add_dataroot_config("d2", &ConfigOptions::new().with("diffexp__top_n", 5))
        .unwrap();

    config
        .update_default_dataset_config(&ConfigOptions::new().with("presentation__max_categories", 7))
        .unwrap();

    let completed = config.complete_config().unwrap();
    for tag in ["d1", "d2"] {
        let settings = completed.get_dataset_config(tag).settings();
        assert_eq!(settings.presentation.max_categories, 7);
    }
    assert_eq!(completed.get_dataset_config("d2").settings().diffexp.top_n, 5);
}

#[test]
fn test_dataroot_override_scenario() {
    let mut config = packaged_app();
    config.update_from_yaml_str(MULTI_DATASET).unwrap();

    let err = config
        .add_dataroot_config("d3", &ConfigOptions::new().with("diffexp__top_n", 5))
        .unwrap_err();
    assert!(matches!(err, ConfigError::DatarootNotFound(_)));

    config
        .add_dataroot_config("d1", &ConfigOptions::new().with("embeddings__enable_reembedding", true))
        .unwrap();

    let completed = config.complete_config().unwrap();
    let d1 = completed.dataroot_config("d1").unwrap();
    assert_eq!(d1.dataroot_tag(), Some("d1"));
    assert!(d1.settings().embeddings.enable_reembedding);

    let mut expected = completed.default_dataset_config().settings().clone();
    expected.embeddings.enable_reembedding = true;
    assert_eq!(d1.settings(), &expected);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_written_config_reads_back(
        port in 1024u16..,
        verbose in any::<bool>(),
        max_categories in 1usize..100_000,
        lfc_cutoff in 0.0f64..10.0,
        title in "Dataset [a-z0-9]{1,12}",
    ) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = packaged_app();
        config.update_server_config(
            &ConfigOptions::new()
                .with("app__port", port)
                .with("app__verbose", verbose)
                .with("single_dataset__title", title.as_str()),
        ).unwrap();
        config.update_default_dataset_config(
            &ConfigOptions::new()
                .with("presentation__max_categories", max_categories)
                .with("diffexp__lfc_cutoff", lfc_cutoff),
        ).unwrap();
        config.write_config(&path).unwrap();

        let mut reread = packaged_app();
        reread.update_from_config_file(&path).unwrap();
        prop_assert_eq!(reread.to_value().unwrap(), config.to_value().unwrap());

        let changes = reread.changes_from_default().unwrap();
        prop_assert_eq!(changes.server.get("app__port"), Some(&Value::from(port)));
        prop_assert_eq!(changes.server.contains_key("app__verbose"), verbose);
        prop_assert_eq!(changes.server.get("single_dataset__title"), Some(&Value::from(title)));
    }
}
