//! Tests for CLI command parsing and validation

#[cfg(test)]
mod tests {
    use clap::Parser;
    use erpops_db::{Param, PatchReport, ReportFormat, TablePatch, normalize_identifier};
    use std::path::PathBuf;

    use crate::config::Config;
    use crate::{Cli, Commands, PatchActions, print_patch_report, schema_name};

    #[test]
    fn test_cli_requires_a_command() {
        assert!(Cli::try_parse_from(["erpops"]).is_err());
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from([
            "erpops",
            "ping",
            "--verbose",
            "--config",
            "/etc/erpops.toml",
            "--format",
            "json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Ping));
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/erpops.toml")));
        assert_eq!(cli.format, Some(ReportFormat::Json));
    }

    #[test]
    fn test_unknown_format_rejected() {
        assert!(Cli::try_parse_from(["erpops", "--format", "csv", "ping"]).is_err());
    }

    #[test]
    fn test_query_with_params() {
        let cli = Cli::try_parse_from([
            "erpops",
            "query",
            "SELECT * FROM staff WHERE id = $1 AND active = $2",
            "--param",
            "int:7",
            "-p",
            "bool:true",
        ])
        .unwrap();
        match cli.command {
            Commands::Query { sql, params } => {
                assert!(sql.starts_with("SELECT"));
                assert_eq!(params, vec![Param::Int(7), Param::Bool(true)]);
            }
            _ => panic!("Expected Query command"),
        }
    }

    #[test]
    fn test_query_with_bad_param_rejected() {
        assert!(Cli::try_parse_from(["erpops", "query", "SELECT $1", "--param", "int:seven"]).is_err());
    }

    #[test]
    fn test_run_file_command() {
        let cli = Cli::try_parse_from(["erpops", "run-file", "fixes/fee_totals.sql"]).unwrap();
        match cli.command {
            Commands::RunFile { path } => assert_eq!(path, PathBuf::from("fixes/fee_totals.sql")),
            _ => panic!("Expected RunFile command"),
        }
    }

    #[test]
    fn test_tables_and_describe() {
        let cli = Cli::try_parse_from(["erpops", "tables", "--schema", "academics"]).unwrap();
        assert!(matches!(cli.command, Commands::Tables { schema: Some(ref s) } if s == "academics"));

        let cli = Cli::try_parse_from(["erpops", "describe", "bus"]).unwrap();
        match cli.command {
            Commands::Describe { table, schema } => {
                assert_eq!(table, "bus");
                assert!(schema.is_none());
            }
            _ => panic!("Expected Describe command"),
        }
    }

    #[test]
    fn test_patch_add_column() {
        let cli = Cli::try_parse_from([
            "erpops",
            "patch",
            "add-column",
            "--table",
            "bus",
            "--column",
            "route_pdf:text",
        ])
        .unwrap();
        assert_eq!(cli.command.name(), "patch add-column");
        match cli.command {
            Commands::Patch {
                action:
                    PatchActions::AddColumn {
                        table,
                        column,
                        not_null,
                        default,
                        schema,
                        create_if_missing,
                    },
            } => {
                assert_eq!(table, "bus");
                assert_eq!(column, "route_pdf:text");
                assert!(!not_null);
                assert!(default.is_none());
                assert!(schema.is_none());
                assert!(!create_if_missing);
            }
            _ => panic!("Expected patch add-column"),
        }
    }

    #[test]
    fn test_patch_add_column_requires_table_and_column() {
        assert!(Cli::try_parse_from(["erpops", "patch", "add-column", "--table", "bus"]).is_err());
        assert!(Cli::try_parse_from(["erpops", "patch", "add-column", "--column", "a:int"]).is_err());
    }

    #[test]
    fn test_patch_apply() {
        let cli = Cli::try_parse_from(["erpops", "patch", "apply", "plans/no_dues.toml"]).unwrap();
        match cli.command {
            Commands::Patch {
                action: PatchActions::Apply { plan },
            } => assert_eq!(plan, PathBuf::from("plans/no_dues.toml")),
            _ => panic!("Expected patch apply"),
        }
    }

    #[test]
    fn test_empty_patch_report_output() {
        let mut out = Vec::new();
        print_patch_report(&PatchReport::default(), ReportFormat::Table, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("(0 rows)"));
        assert!(text.trim_end().ends_with("0 added, 0 already present, 0 failed"));

        let mut out = Vec::new();
        print_patch_report(&PatchReport::default(), ReportFormat::Json, &mut out).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["entries"], serde_json::json!([]));
    }

    #[test]
    fn test_schema_name_is_folded_like_patch_targets() {
        let config = Config::default();
        assert_eq!(schema_name(Some("Academics".to_string()), &config).unwrap(), "academics");
        assert_eq!(schema_name(None, &config).unwrap(), config.output.schema.to_lowercase());
        assert_eq!(schema_name(Some("public; drop".to_string()), &config).unwrap_err().exit_code(), 2);
        assert_eq!(normalize_identifier("Bus").unwrap(), "bus");
        assert_eq!(TablePatch::new("Bus").display_name().unwrap(), "public.bus");
    }
}
