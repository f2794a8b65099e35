//! Tests for DSN parsing and building

use crate::dsn::{
    MssqlConnectOptions, build_connection_string, parse_dsn, parse_encryption, split_host_port,
};
use std::time::Duration;
use tdsql_core::{ConnectionConfig, TdsqlError};
use tiberius::EncryptionLevel;

mod parse_dsn_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_basic_dsn() {
        let config =
            parse_dsn("server=localhost;user id=sa;password=secret;database=pubs").unwrap();
        assert_eq!(config.driver, "mssql");
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 0);
        assert_eq!(config.username.as_deref(), Some("sa"));
        assert_eq!(config.password.as_deref(), Some("secret"));
        assert_eq!(config.database.as_deref(), Some("pubs"));
    }

    #[test]
    fn test_parse_keys_are_case_insensitive_and_trimmed() {
        let config = parse_dsn(" Server = db1 ; Initial Catalog = pubs ; UID = app ; PWD = pw ")
            .unwrap();
        assert_eq!(config.host, "db1");
        assert_eq!(config.database.as_deref(), Some("pubs"));
        assert_eq!(config.username.as_deref(), Some("app"));
        assert_eq!(config.password.as_deref(), Some("pw"));
    }

    #[test]
    fn test_parse_host_with_comma_port() {
        let config = parse_dsn("Data Source=tcp:db.internal,14330;User=sa").unwrap();
        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 14330);
    }

    #[test]
    fn test_parse_host_with_colon_port_and_explicit_port() {
        let config = parse_dsn("addr=db:1500").unwrap();
        assert_eq!(config.port, 1500);

        let config = parse_dsn("host=db;port=1501").unwrap();
        assert_eq!(config.host, "db");
        assert_eq!(config.port, 1501);
    }

    #[test]
    fn test_parse_canonicalises_known_params() {
        let config = parse_dsn(
            "server=db;app=tdsql tests;mirror=db2,1433;encrypt=false;\
             TrustServerCertificate=yes;max_pool_size=7;lock_timeout=500;connect_timeout=3",
        )
        .unwrap();
        assert_eq!(config.params["application_name"], "tdsql tests");
        assert_eq!(config.params["mirror"], "db2,1433");
        assert_eq!(config.params["encrypt"], "false");
        assert_eq!(config.params["trust_server_certificate"], "yes");
        assert_eq!(config.get_u64("max_pool_size").unwrap(), Some(7));
        assert_eq!(config.get_u64("lock_timeout").unwrap(), Some(500));
        assert_eq!(config.get_u64("connect_timeout").unwrap(), Some(3));
    }

    #[test]
    fn test_parse_keeps_unknown_keys() {
        let config = parse_dsn("server=db;Workstation ID=box7;log=63").unwrap();
        assert_eq!(config.params["workstation id"], "box7");
        assert_eq!(config.params["log"], "63");
    }

    #[test]
    fn test_parse_braced_value() {
        let config = parse_dsn("server=db;password={se;cr}}et} ;database=pubs").unwrap();
        assert_eq!(config.password.as_deref(), Some("se;cr}et"));
        assert_eq!(config.database.as_deref(), Some("pubs"));
    }

    #[test]
    fn test_parse_ignores_empty_segments() {
        let config = parse_dsn(";;server=db;;database=pubs;").unwrap();
        assert_eq!(config.host, "db");
        assert_eq!(config.database.as_deref(), Some("pubs"));
    }

    #[test]
    fn test_parse_empty_value_is_kept() {
        let config = parse_dsn("server=db;password=").unwrap();
        assert_eq!(config.password.as_deref(), Some(""));
    }
}

mod parse_dsn_error_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config_error(dsn: &str) -> String {
        match parse_dsn(dsn) {
            Err(TdsqlError::Configuration(msg)) => msg,
            other => panic!("expected configuration error for {:?}, got {:?}", dsn, other),
        }
    }

    #[test]
    fn test_missing_host() {
        assert!(config_error("user id=sa;password=x").contains("server"));
        config_error("");
    }

    #[test]
    fn test_segment_without_equals() {
        assert!(config_error("server=db;garbage").contains("garbage"));
    }

    #[test]
    fn test_bad_numbers() {
        assert!(config_error("server=db;port=abc").contains("port"));
        assert!(config_error("server=db,99999").contains("port"));
        assert!(config_error("server=db;lock_timeout=soon").contains("lock_timeout"));
        assert!(config_error("server=db;max_pool_size=-1").contains("max_pool_size"));
    }

    #[test]
    fn test_bad_flags() {
        assert!(config_error("server=db;encrypt=sometimes").contains("encrypt"));
        assert!(config_error("server=db;trust_cert=maybe").contains("trust_cert"));
    }

    #[test]
    fn test_unterminated_brace() {
        assert!(config_error("server=db;password={abc").contains("unterminated"));
    }

    #[test]
    fn test_named_instance_rejected() {
        assert!(config_error("server=db\\SQLEXPRESS").contains("named instances"));
    }
}

mod build_connection_string_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_basic() {
        let mut config = ConnectionConfig::new("mssql");
        config.host = "db.internal".into();
        config.port = 1433;
        config.database = Some("pubs".into());
        config.username = Some("sa".into());
        config.password = Some("secret".into());

        assert_eq!(
            build_connection_string(&config),
            "Server=db.internal,1433;Database=pubs;User Id=sa;Password=secret"
        );
    }

    #[test]
    fn test_build_defaults_host_and_port() {
        let config = ConnectionConfig::new("mssql");
        assert_eq!(build_connection_string(&config), "Server=localhost,1433");
    }

    #[test]
    fn test_build_quotes_awkward_values() {
        let mut config = ConnectionConfig::new("mssql");
        config.host = "db".into();
        config.username = Some("sa".into());
        config.password = Some("a;b}c".into());

        let built = build_connection_string(&config);
        assert_eq!(built, "Server=db,1433;User Id=sa;Password={a;b}}c}");

        let reparsed = parse_dsn(&built).unwrap();
        assert_eq!(reparsed.password.as_deref(), Some("a;b}c"));
    }

    #[test]
    fn test_build_then_parse_keeps_params() {
        let config = parse_dsn("server=db,1500;database=pubs;lock_timeout=250;app=tests").unwrap();
        let reparsed = parse_dsn(&build_connection_string(&config)).unwrap();
        assert_eq!(reparsed.host, "db");
        assert_eq!(reparsed.port, 1500);
        assert_eq!(reparsed.database.as_deref(), Some("pubs"));
        assert_eq!(reparsed.params["lock_timeout"], "250");
        assert_eq!(reparsed.params["application_name"], "tests");
    }
}

mod connect_options_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_options_defaults() {
        let config = parse_dsn("server=db;user id=sa;password=pw").unwrap();
        let opts = MssqlConnectOptions::from_config(&config).unwrap();
        assert_eq!(opts.host, "db");
        assert_eq!(opts.port, 1433);
        assert!(matches!(opts.encryption, EncryptionLevel::Required));
        assert!(!opts.trust_cert);
        assert_eq!(opts.mirror, None);
        assert_eq!(opts.lock_timeout, None);
        assert_eq!(opts.connect_timeout, None);
    }

    #[test]
    fn test_options_from_full_dsn() {
        let config = parse_dsn(
            "server=db,1500;mirror=db2;encrypt=no;trust_server_certificate=true;\
             lock_timeout=500;connect_timeout=5;app=suite",
        )
        .unwrap();
        let opts = MssqlConnectOptions::from_config(&config).unwrap();
        assert_eq!(opts.port, 1500);
        assert_eq!(opts.mirror, Some(("db2".to_string(), 1433)));
        assert!(matches!(opts.encryption, EncryptionLevel::Off));
        assert!(opts.trust_cert);
        assert_eq!(opts.lock_timeout, Some(500));
        assert_eq!(opts.connect_timeout, Some(Duration::from_secs(5)));
        assert_eq!(opts.application_name.as_deref(), Some("suite"));
    }

    #[test]
    fn test_options_debug_hides_password() {
        let config = parse_dsn("server=db;user id=sa;password=hunter2").unwrap();
        let opts = MssqlConnectOptions::from_config(&config).unwrap();
        assert!(!format!("{:?}", opts).contains("hunter2"));
    }

    #[test]
    fn test_tiberius_config_address() {
        let config = parse_dsn("server=db,1500;user id=sa;password=pw").unwrap();
        let opts = MssqlConnectOptions::from_config(&config).unwrap();
        let tib = opts.tiberius_config("mirror-host", 1600).unwrap();
        assert_eq!(tib.get_addr(), "mirror-host:1600");
    }

    #[cfg(not(windows))]
    #[test]
    fn test_tiberius_config_requires_user_off_windows() {
        let config = parse_dsn("server=db").unwrap();
        let opts = MssqlConnectOptions::from_config(&config).unwrap();
        assert!(opts.tiberius_config("db", 1433).is_err());
    }
}

#[test]
fn test_split_host_port() {
    assert_eq!(split_host_port("db").unwrap(), ("db".to_string(), None));
    assert_eq!(
        split_host_port("db, 1433").unwrap(),
        ("db".to_string(), Some(1433))
    );
    assert_eq!(
        split_host_port("TCP:db:1434").unwrap(),
        ("db".to_string(), Some(1434))
    );
    assert!(split_host_port(",1433").is_err());
}

#[test]
fn test_parse_encryption_spellings() {
    assert!(matches!(parse_encryption("Required").unwrap(), EncryptionLevel::Required));
    assert!(matches!(parse_encryption("yes").unwrap(), EncryptionLevel::Required));
    assert!(matches!(parse_encryption("on").unwrap(), EncryptionLevel::On));
    assert!(matches!(parse_encryption("off").unwrap(), EncryptionLevel::Off));
    assert!(matches!(
        parse_encryption("not_supported").unwrap(),
        EncryptionLevel::NotSupported
    ));
    assert!(parse_encryption("sometimes").is_err());
}
